pub mod data_service;
pub mod trading_service;

pub use data_service::DataService;
pub use trading_service::TradingService;
