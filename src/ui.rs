//! Interface de terminal do BIDTRACK — spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`ExecutionProgress`] acompanha visualmente
//! o ciclo de vida de uma execução no terminal.

use std::collections::BTreeMap;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use bidtrack::state_machine::{ExecutionState, ExecutionStateType, VerificationTally};

/// Indicador visual de progresso para uma execução no terminal.
///
/// Exibe um spinner animado enquanto a execução avança e mensagens
/// coloridas para conclusão (verde), descarte (vermelho) e duplicatas (amarelo).
pub struct ExecutionProgress {
    // Barra de progresso/spinner do indicatif.
    pb: ProgressBar,
    // Rótulo da execução (job:nó:referência).
    label: String,
    green: Style,
    red: Style,
    yellow: Style,
}

impl ExecutionProgress {
    /// Inicia o spinner para a execução indicada.
    pub fn start(execution: &ExecutionState) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        let label = execution.to_string();
        pb.set_message(format!("{}: {label}", execution.state));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            label,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Atualiza a mensagem do spinner para refletir o estado atual.
    pub fn update_state(&self, state: ExecutionStateType) {
        self.pb.set_message(format!("{state}: {}", self.label));
    }

    /// Avisa que uma entrega repetida foi tratada como duplicata.
    pub fn duplicate(&self, state: ExecutionStateType) {
        self.pb.println(format!(
            "  {} duplicate delivery ignored ({state})",
            self.yellow.apply_to("↻")
        ));
    }

    /// Finaliza o spinner e exibe o estado final da execução.
    pub fn finish(&self, execution: &ExecutionState) {
        self.pb.finish_and_clear();
        if execution.state == ExecutionStateType::Completed {
            println!("  {} {} completed", self.green.apply_to("✓"), self.label);
        } else {
            println!(
                "  {} {} ended in {}: {}",
                self.red.apply_to("✗"),
                self.label,
                execution.state,
                execution.status
            );
        }
    }
}

/// Imprime a tabela de estados com classificação e sucessores.
pub fn print_states() {
    let dim = Style::new().dim();
    for state in ExecutionStateType::ALL {
        let mut tags = Vec::new();
        if state.is_active() {
            tags.push("active");
        }
        if state.is_discarded() {
            tags.push("discarded");
        }
        if state.is_terminal() {
            tags.push("terminal");
        }
        let successors: Vec<_> = state.successors().iter().map(|s| s.to_string()).collect();
        println!(
            "{:<18} {:<28} {}",
            state,
            dim.apply_to(tags.join(",")),
            successors.join(" | ")
        );
    }
}

/// Imprime o placar de verificação e o histograma de estados de um job.
pub fn print_summary(
    job_id: &str,
    tally: VerificationTally,
    counts: &BTreeMap<ExecutionStateType, usize>,
) {
    let bold = Style::new().bold();
    println!();
    println!("{}", bold.apply_to(format!("─── Job {job_id} ───")));
    println!(
        "  verification: {} passed, {} failed",
        Style::new().green().apply_to(tally.passed),
        Style::new().red().apply_to(tally.failed)
    );
    for (state, count) in counts {
        println!("  {state:<18} {count}");
    }
}
