//! Value denominations.

/// Smallest unit of value.
pub type Wei = u128;

pub const WEI_PER_GWEI: Wei = 1_000_000_000;
pub const WEI_PER_ETHER: Wei = 1_000_000_000_000_000_000;

const ETHER_DECIMALS: usize = 18;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EtherParseError {
    #[error("empty amount")]
    Empty,
    #[error("invalid digit in amount {0:?}")]
    InvalidDigit(String),
    #[error("amount {0:?} has more than 18 fractional digits")]
    TooPrecise(String),
    #[error("amount {0:?} overflows")]
    Overflow(String),
}

/// Parses a decimal ether amount such as `"0.03"` into wei, exactly.
pub fn parse_ether(amount: &str) -> Result<Wei, EtherParseError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(EtherParseError::Empty);
    }
    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (amount, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(EtherParseError::Empty);
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(fraction) {
        return Err(EtherParseError::InvalidDigit(amount.to_string()));
    }
    if fraction.len() > ETHER_DECIMALS {
        return Err(EtherParseError::TooPrecise(amount.to_string()));
    }

    let overflow = || EtherParseError::Overflow(amount.to_string());
    let whole_wei = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<Wei>()
            .map_err(|_| overflow())?
            .checked_mul(WEI_PER_ETHER)
            .ok_or_else(overflow)?
    };
    let fraction_wei = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", fraction, width = ETHER_DECIMALS);
        padded.parse::<Wei>().map_err(|_| overflow())?
    };
    whole_wei.checked_add(fraction_wei).ok_or_else(overflow)
}

/// Renders wei as a decimal ether string without trailing zeros.
pub fn format_ether(wei: Wei) -> String {
    let whole = wei / WEI_PER_ETHER;
    let fraction = wei % WEI_PER_ETHER;
    if fraction == 0 {
        return whole.to_string();
    }
    let fraction = format!("{:0>width$}", fraction, width = ETHER_DECIMALS);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}
