mod exp;

pub use exp::{Episode, Exp};
