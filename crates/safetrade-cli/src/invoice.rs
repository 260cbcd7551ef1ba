//! # Invoice Subcommand

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use rust_decimal::Decimal;
use safetrade_state::{derive_amounts, validate_amounts, DerivedAmounts};

#[derive(Args, Debug)]
pub struct InvoiceArgs {
    #[command(subcommand)]
    pub command: InvoiceCommand,
}

#[derive(Subcommand, Debug)]
pub enum InvoiceCommand {
    /// Derive VAT and gross total from a net amount.
    Derive {
        /// Net amount, e.g. 1000.00.
        #[arg(long)]
        amount: Decimal,
        /// VAT percentage.
        #[arg(long, default_value = "19")]
        vat: Decimal,
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

pub fn derive(amount: Decimal, vat: Decimal) -> Result<DerivedAmounts> {
    validate_amounts(amount, vat).context("cannot derive invoice amounts")?;
    Ok(derive_amounts(amount, vat))
}

pub fn run_invoice(args: &InvoiceArgs) -> Result<u8> {
    match &args.command {
        InvoiceCommand::Derive { amount, vat, json } => {
            let derived = derive(*amount, *vat)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&derived)?);
            } else {
                println!("amount:       {amount}");
                println!("vat ({vat}%):  {}", derived.vat_amount);
                println!("total_amount: {}", derived.total_amount);
            }
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_reference_values() {
        let d = derive(Decimal::new(100_000, 2), Decimal::new(19, 0)).unwrap();
        assert_eq!(d.vat_amount.to_string(), "190.00");
        assert_eq!(d.total_amount.to_string(), "1190.00");
    }

    #[test]
    fn test_derive_rejects_out_of_range_vat() {
        assert!(derive(Decimal::new(100, 0), Decimal::new(101, 0)).is_err());
        assert!(derive(Decimal::ZERO, Decimal::new(19, 0)).is_err());
    }

    #[test]
    fn test_derive_rejects_sub_cent_amounts() {
        assert!(derive(Decimal::new(4, 3), Decimal::ONE_HUNDRED).is_err());
    }
}
