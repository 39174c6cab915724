pub mod counters;
pub mod meta;
pub mod raw;
