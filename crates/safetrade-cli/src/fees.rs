//! # Fees Subcommand
//!
//! Quotes the buyer service fee, the dealer commission and the resulting
//! seller payout for a purchase price under a fee schedule.

use anyhow::{Context, Result};
use clap::Args;
use rust_decimal::Decimal;
use safetrade_core::Currency;
use safetrade_state::{FeeSchedule, Settlement};

#[derive(Args, Debug)]
pub struct FeesArgs {
    /// Purchase price.
    #[arg(long)]
    pub amount: Decimal,

    /// The trade is brokered by a dealer.
    #[arg(long)]
    pub dealer: bool,

    /// ISO 4217 currency code.
    #[arg(long, default_value = "EUR")]
    pub currency: String,

    /// Override the buyer fee percentage.
    #[arg(long)]
    pub buyer_fee: Option<Decimal>,

    /// Override the dealer commission percentage.
    #[arg(long)]
    pub dealer_commission: Option<Decimal>,

    /// Emit JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

impl FeesArgs {
    fn schedule(&self) -> Result<FeeSchedule> {
        let defaults = FeeSchedule::default();
        let schedule = FeeSchedule {
            buyer_fee_percentage: self.buyer_fee.unwrap_or(defaults.buyer_fee_percentage),
            dealer_commission_percentage: self
                .dealer_commission
                .unwrap_or(defaults.dealer_commission_percentage),
            ..defaults
        };
        schedule.validate().context("invalid fee schedule")?;
        Ok(schedule)
    }
}

pub fn quote(args: &FeesArgs) -> Result<Settlement> {
    let currency = Currency::new(&args.currency).context("invalid currency")?;
    let settlement = args
        .schedule()?
        .quote(args.amount, currency, args.dealer)
        .context("amount outside the accepted range")?;
    Ok(settlement)
}

pub fn run_fees(args: &FeesArgs) -> Result<u8> {
    let s = quote(args)?;
    tracing::debug!(amount = %args.amount, dealer = args.dealer, "quoted settlement");
    if args.json {
        println!("{}", serde_json::to_string_pretty(&s)?);
    } else {
        println!("gross_amount:      {} {}", s.gross_amount, s.currency);
        println!("service_fee:       {}", s.service_fee);
        println!("dealer_commission: {}", s.dealer_commission);
        println!("seller_payout:     {}", s.seller_payout);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(amount: i64, dealer: bool) -> FeesArgs {
        FeesArgs {
            amount: Decimal::new(amount, 0),
            dealer,
            currency: "EUR".to_string(),
            buyer_fee: None,
            dealer_commission: None,
            json: false,
        }
    }

    #[test]
    fn test_private_sale_pays_no_commission() {
        let s = quote(&args(10_000, false)).unwrap();
        assert_eq!(s.service_fee.to_string(), "250.00");
        assert!(s.dealer_commission.is_zero());
        assert_eq!(s.seller_payout.to_string(), "9750.00");
    }

    #[test]
    fn test_brokered_sale_pays_commission() {
        let s = quote(&args(10_000, true)).unwrap();
        assert_eq!(s.dealer_commission.to_string(), "300.00");
        assert_eq!(s.seller_payout.to_string(), "9450.00");
    }

    #[test]
    fn test_overrides_are_validated() {
        let mut a = args(10_000, true);
        a.buyer_fee = Some(Decimal::new(99, 0));
        assert!(quote(&a).is_err());
    }

    #[test]
    fn test_amount_bounds() {
        assert!(quote(&args(100, false)).is_err());
        assert!(quote(&args(1_000_000, false)).is_err());
    }
}
