//! # Check Subcommand
//!
//! Runs the transition validator for a single `from -> to` edge and role.
//! Exits 0 when the edge is allowed and 2 when it is refused, so scripts
//! can branch on the result.

use anyhow::{anyhow, Result};
use clap::Args;
use safetrade_core::ActorRole;
use safetrade_state::{
    check, DisputeStatus, InvoiceStatus, LifecycleStatus, ModerationStatus, TransactionStatus,
    Verdict,
};

use crate::{Entity, EXIT_REJECTED};

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[arg(long, value_enum)]
    pub entity: Entity,

    /// Current status token, e.g. `payment_submitted`.
    #[arg(long)]
    pub from: String,

    /// Requested status token.
    #[arg(long)]
    pub to: String,

    /// Acting role: buyer, seller, dealer, admin or system.
    #[arg(long, default_value = "admin")]
    pub role: String,

    /// Emit the verdict as JSON.
    #[arg(long)]
    pub json: bool,
}

fn parse_status<S: LifecycleStatus>(entity: Entity, name: &str) -> Result<S> {
    S::from_name(name).ok_or_else(|| {
        let known: Vec<&str> = S::all().iter().map(|s| s.as_str()).collect();
        anyhow!(
            "unknown {} status {name:?}; expected one of: {}",
            entity.as_str(),
            known.join(", ")
        )
    })
}

fn check_named<S: LifecycleStatus>(
    entity: Entity,
    from: &str,
    to: &str,
    role: ActorRole,
) -> Result<Verdict> {
    let from: S = parse_status(entity, from)?;
    let to: S = parse_status(entity, to)?;
    Ok(check(from, to, role))
}

/// Validate the edge named by `args`.
pub fn verdict(args: &CheckArgs) -> Result<Verdict> {
    let role = ActorRole::from_name(&args.role)
        .ok_or_else(|| anyhow!("unknown role {:?}", args.role))?;
    let (from, to) = (args.from.as_str(), args.to.as_str());
    match args.entity {
        Entity::Transaction => check_named::<TransactionStatus>(args.entity, from, to, role),
        Entity::Dispute => check_named::<DisputeStatus>(args.entity, from, to, role),
        Entity::Invoice => check_named::<InvoiceStatus>(args.entity, from, to, role),
        Entity::Review => check_named::<ModerationStatus>(args.entity, from, to, role),
    }
}

pub fn run_check(args: &CheckArgs) -> Result<u8> {
    let verdict = verdict(args)?;
    if args.json {
        println!("{}", serde_json::to_string(&verdict)?);
    } else {
        match &verdict {
            Verdict::Allow => println!("allow: {} -> {} as {}", args.from, args.to, args.role),
            Verdict::Reject(r) => println!("reject ({:?}): {}", r.kind, r.reason),
        }
    }
    Ok(if verdict.is_allowed() { 0 } else { EXIT_REJECTED })
}

#[cfg(test)]
mod tests {
    use super::*;
    use safetrade_state::RejectionKind;

    fn args(entity: Entity, from: &str, to: &str, role: &str) -> CheckArgs {
        CheckArgs {
            entity,
            from: from.to_string(),
            to: to.to_string(),
            role: role.to_string(),
            json: false,
        }
    }

    #[test]
    fn test_allowed_edge_exits_zero() {
        let a = args(Entity::Transaction, "payment_submitted", "payment_verified", "admin");
        assert_eq!(verdict(&a).unwrap(), Verdict::Allow);
        assert_eq!(run_check(&a).unwrap(), 0);
    }

    #[test]
    fn test_skipped_stage_is_rejected() {
        let a = args(Entity::Transaction, "pending", "payment_verified", "admin");
        match verdict(&a).unwrap() {
            Verdict::Reject(r) => assert_eq!(r.kind, RejectionKind::IllegalEdge),
            Verdict::Allow => panic!("pending -> payment_verified must be refused"),
        }
        assert_eq!(run_check(&a).unwrap(), EXIT_REJECTED);
    }

    #[test]
    fn test_wrong_role_is_unauthorized() {
        let a = args(Entity::Invoice, "paid", "confirmed", "buyer");
        match verdict(&a).unwrap() {
            Verdict::Reject(r) => assert_eq!(r.kind, RejectionKind::Unauthorized),
            Verdict::Allow => panic!("only admins confirm invoices"),
        }
    }

    #[test]
    fn test_unknown_names_are_errors() {
        assert!(verdict(&args(Entity::Dispute, "open", "reopened", "admin")).is_err());
        assert!(verdict(&args(Entity::Dispute, "open", "investigating", "root")).is_err());
    }
}
