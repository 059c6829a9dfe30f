mod helpers;
mod money;
pub mod op;
mod secret;

pub use helpers::parse_boolean_flag;
pub use money::{Money, MoneyConversionError, MONEY_SCALE};
pub use secret::Secret;
