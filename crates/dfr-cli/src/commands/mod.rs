pub mod fingerprint;
pub mod history;
pub mod rules;
pub mod stats;
pub mod validate;
