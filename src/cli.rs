//! Interface de linha de comando do BIDTRACK baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (demo, states, inspect)
//! e a flag global --verbose.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// BIDTRACK — Máquina de estados de execuções para marketplaces de computação.
#[derive(Debug, Parser)]
#[command(name = "bidtrack", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Habilita saída detalhada (logs em nível debug).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa uma execução completa (ask for bid até publicação) em memória.
    Demo {
        /// Identificador do job simulado.
        #[arg(long, default_value = "demo-job")]
        job: String,

        /// Identificadores dos nós que recebem o pedido de lance.
        #[arg(long = "node", default_values_t = vec!["QmDemoNodeAlpha".to_string()])]
        nodes: Vec<String>,
    },

    /// Lista todos os estados com sua classificação e sucessores legais.
    States,

    /// Decodifica um conjunto de execuções em JSON e mostra o resumo.
    Inspect {
        /// Caminho para o arquivo JSON do job.
        file: PathBuf,
    },
}
