pub mod mt5;
