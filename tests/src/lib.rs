//! Cross-crate scenarios for NeonOps. Everything lives in test modules.

#[cfg(test)]
mod unit;
