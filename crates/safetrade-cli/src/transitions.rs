//! # Transitions Subcommand
//!
//! Prints the transition table of one or all state machines, either as
//! aligned text or as JSON.

use anyhow::Result;
use clap::Args;
use safetrade_state::{
    DisputeStatus, InvoiceStatus, LifecycleStatus, ModerationStatus, TransactionStatus,
};
use serde::Serialize;

use crate::Entity;

#[derive(Args, Debug)]
pub struct TransitionsArgs {
    /// Only this state machine.
    #[arg(long, value_enum)]
    pub entity: Option<Entity>,

    /// Emit JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

/// One edge of a transition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: &'static str,
    pub to: &'static str,
    pub roles: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub entity: &'static str,
    pub terminal: Vec<&'static str>,
    pub edges: Vec<Edge>,
}

fn table_for<S: LifecycleStatus>(entity: Entity) -> Table {
    let mut edges = Vec::new();
    let mut terminal = Vec::new();
    for from in S::all() {
        if from.is_terminal() {
            terminal.push(from.as_str());
        }
        for to in from.valid_transitions() {
            edges.push(Edge {
                from: from.as_str(),
                to: to.as_str(),
                roles: from.permitted_roles(*to).iter().map(|r| r.as_str()).collect(),
            });
        }
    }
    Table {
        entity: entity.as_str(),
        terminal,
        edges,
    }
}

pub fn table(entity: Entity) -> Table {
    match entity {
        Entity::Transaction => table_for::<TransactionStatus>(entity),
        Entity::Dispute => table_for::<DisputeStatus>(entity),
        Entity::Invoice => table_for::<InvoiceStatus>(entity),
        Entity::Review => table_for::<ModerationStatus>(entity),
    }
}

pub fn render_text(table: &Table) -> String {
    let width = table.edges.iter().map(|e| e.from.len()).max().unwrap_or(0);
    let mut out = format!("{}\n", table.entity);
    for edge in &table.edges {
        out.push_str(&format!(
            "  {:width$} -> {}  [{}]\n",
            edge.from,
            edge.to,
            edge.roles.join(", "),
        ));
    }
    out.push_str(&format!("  terminal: {}\n", table.terminal.join(", ")));
    out
}

pub fn run_transitions(args: &TransitionsArgs) -> Result<u8> {
    let entities: Vec<Entity> = match args.entity {
        Some(e) => vec![e],
        None => Entity::ALL.to_vec(),
    };
    let tables: Vec<Table> = entities.into_iter().map(table).collect();
    tracing::debug!(count = tables.len(), "rendering transition tables");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tables)?);
    } else {
        for t in &tables {
            print!("{}", render_text(t));
        }
    }
    Ok(0)
}
