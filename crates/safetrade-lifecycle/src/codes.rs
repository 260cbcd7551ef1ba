//! Human-readable reference codes.
//!
//! - Transaction code: `AS24-TXN-{YYYY}-{6 alphanumerics}`
//! - Payment reference: `AS24-REF-{12 alphanumerics}`, quoted on the wire
//! - Invoice number: `INV-{YYYY}-{5-digit sequence}`, monotonic per year

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::Rng;
use safetrade_core::Timestamp;
use safetrade_state::ReferenceCodes;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn random_code<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

pub fn transaction_code<R: Rng + ?Sized>(year: i32, rng: &mut R) -> String {
    format!("AS24-TXN-{year}-{}", random_code(rng, 6))
}

pub fn payment_reference<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("AS24-REF-{}", random_code(rng, 12))
}

/// Fresh codes for a trade opened at `now`.
pub fn reference_codes(now: Timestamp) -> ReferenceCodes {
    let mut rng = rand::thread_rng();
    ReferenceCodes {
        transaction_code: transaction_code(now.year(), &mut rng),
        payment_reference: payment_reference(&mut rng),
    }
}

/// Per-year invoice counter.
#[derive(Debug, Default)]
pub struct InvoiceNumberSequence {
    last: Mutex<HashMap<i32, u32>>,
}

impl InvoiceNumberSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue numbering after `last` for `year`, e.g. after a restart.
    pub fn resume(&self, year: i32, last: u32) {
        let mut guard = self.last.lock();
        let entry = guard.entry(year).or_insert(0);
        *entry = (*entry).max(last);
    }

    pub fn next(&self, year: i32) -> String {
        let mut guard = self.last.lock();
        let n = guard.entry(year).or_insert(0);
        *n += 1;
        format!("INV-{year}-{:05}", *n)
    }
}

/// Parse the year and sequence out of an invoice number.
pub fn parse_invoice_number(number: &str) -> Option<(i32, u32)> {
    let rest = number.strip_prefix("INV-")?;
    let (year, seq) = rest.split_once('-')?;
    Some((year.parse().ok()?, seq.parse().ok()?))
}
