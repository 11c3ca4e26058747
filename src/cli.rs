//! Interface de linha de comando do Translalia baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (translate, status,
//! retry, demo) e flags globais (--model, --verbose).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Translalia — tradução de poesia com variantes ranqueadas.
#[derive(Debug, Parser)]
#[command(name = "translalia", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Modelo de geração a usar nesta sessão.
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Traduz um poema lido de um arquivo (ou de stdin, se omitido).
    Translate {
        /// Caminho do arquivo com o poema.
        file: Option<PathBuf>,

        /// Língua de origem.
        #[arg(long, default_value = "pt")]
        from: String,

        /// Língua de destino.
        #[arg(long, default_value = "en")]
        to: String,

        /// Notas de estilo repassadas intactas ao modelo.
        #[arg(long)]
        style: Option<String>,

        /// Segmenta por estrofe em vez de por linha.
        #[arg(long, default_value_t = false)]
        stanza: bool,

        /// Grava o registro final do job como JSON neste caminho.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Mostra o progresso registrado em um arquivo de job salvo com --output.
    Status {
        /// Caminho do arquivo JSON do job.
        file: PathBuf,
    },

    /// Retenta uma unidade ou uma estrofe de um job salvo com --output.
    Retry {
        /// Caminho do arquivo JSON do job (atualizado no lugar).
        file: PathBuf,

        /// Índice da unidade a retentar.
        #[arg(long, conflicts_with = "stanza")]
        unit: Option<usize>,

        /// Índice da estrofe a retentar por inteiro.
        #[arg(long)]
        stanza: Option<usize>,

        /// Retenta mesmo o que já foi traduzido, descartando o resultado anterior.
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Executa a demonstração embutida, sem chamadas de rede.
    Demo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_translate_subcommand() {
        let cli = Cli::parse_from(["translalia", "translate", "poema.txt", "--to", "fr"]);
        match cli.command {
            Command::Translate {
                file, to, stanza, ..
            } => {
                assert_eq!(file.unwrap(), PathBuf::from("poema.txt"));
                assert_eq!(to, "fr");
                assert!(!stanza);
            }
            _ => panic!("expected Translate command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "translalia",
            "--model",
            "claude-opus-4-6",
            "--verbose",
            "demo",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.model.as_deref(), Some("claude-opus-4-6"));
    }

    #[test]
    fn cli_parses_status_subcommand() {
        let cli = Cli::parse_from(["translalia", "status", "job.json"]);
        match cli.command {
            Command::Status { file } => assert_eq!(file, PathBuf::from("job.json")),
            _ => panic!("expected Status command"),
        }
    }

    #[test]
    fn cli_parses_retry_subcommand() {
        let cli = Cli::parse_from(["translalia", "retry", "job.json", "--unit", "2", "--force"]);
        match cli.command {
            Command::Retry {
                unit,
                stanza,
                force,
                ..
            } => {
                assert_eq!(unit, Some(2));
                assert!(stanza.is_none());
                assert!(force);
            }
            _ => panic!("expected Retry command"),
        }
    }

    #[test]
    fn cli_rejects_retry_with_both_unit_and_stanza() {
        let result =
            Cli::try_parse_from(["translalia", "retry", "job.json", "--unit", "1", "--stanza", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
