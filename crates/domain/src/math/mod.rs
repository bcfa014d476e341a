pub mod price_tick;
