//! Interface de terminal do Translalia — barra de progresso e saída colorida.
//!
//! Usa as crates `indicatif` para a barra de progresso e `console` para
//! estilização com cores. O [`JobProgress`] acompanha visualmente
//! a tradução de um poema no terminal, unidade por unidade.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::job::record::JobStatus;
use crate::progress::ProgressSummary;
use crate::scheduler::TickReport;

/// Indicador visual de progresso para um job de tradução no terminal.
///
/// Exibe uma barra por unidades traduzidas e mensagens coloridas para
/// sucesso (verde), falha (vermelho) e espera por rate limit (amarelo).
pub struct JobProgress {
    // Barra de progresso do indicatif.
    pb: ProgressBar,
    // Estilo verde para mensagens de sucesso.
    green: Style,
    // Estilo vermelho para mensagens de falha.
    red: Style,
    // Estilo amarelo para avisos.
    yellow: Style,
}

impl JobProgress {
    /// Inicia a barra com o total de unidades do job.
    pub fn start(description: &str, total_units: usize) -> Self {
        let pb = ProgressBar::new(total_units as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {pos}/{len}")
                .expect("invalid template")
                .progress_chars("=> "),
        );
        pb.set_message(description.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Atualiza a barra após um tick.
    pub fn update(&self, report: &TickReport) {
        self.pb.set_position(report.summary.translated as u64);
        if report.rate_limited {
            self.pb.println(format!(
                "  {} Rate limit reached; waiting for the window to reset",
                self.yellow.apply_to("…")
            ));
        }
        if report.summary.failed > 0 {
            self.pb.set_message(format!(
                "{} failed, retrying with backoff",
                report.summary.failed
            ));
        }
    }

    /// Finaliza a barra e exibe o resultado final do job.
    ///
    /// Sucesso é mostrado em verde com checkmark; falha em vermelho com X.
    pub fn complete(&self, status: JobStatus, summary: &ProgressSummary) {
        self.pb.finish_and_clear();
        match status {
            JobStatus::Completed => {
                println!(
                    "  {} Translated {} of {} units",
                    self.green.apply_to("✓"),
                    summary.translated,
                    summary.total
                );
            }
            _ => {
                println!(
                    "  {} Stopped at {}% ({} failed)",
                    self.red.apply_to("✗"),
                    summary.percent,
                    summary.failed
                );
            }
        }
    }

    /// Imprime o relatório do tick formatado em JSON com estilo colorido.
    pub fn print_report(&self, report: &TickReport) {
        let status_style = match report.job_status {
            JobStatus::Completed => &self.green,
            JobStatus::Failed => &self.red,
            _ => &self.yellow,
        };
        println!();
        println!("{}", status_style.apply_to("─── Tick Report ───"));
        println!(
            "{}",
            serde_json::to_string_pretty(report).unwrap_or_default()
        );
    }
}
