pub mod feed;
pub mod fmp;
pub mod gdp;
pub mod loader;
pub mod reference;
pub mod types;

pub use feed::{FeedError, MemoryPriceFeed, PriceFeed};
pub use fmp::{CompanyProfile, Constituent, FmpClient, RawDailyBar, TOP_CONSTITUENTS};
pub use gdp::{gdp_for_year, load_state_gdp, read_state_gdp, GdpSnapshot, StateGdp};
pub use loader::{write_bars, CsvPriceFeed};
pub use reference::{
    load_acquisitions, load_market_caps, load_ticker_names, load_ticker_sectors,
    read_acquisitions, read_market_caps, read_ticker_names, read_ticker_sectors,
    AcquisitionRecord, MarketCapRow, TableError, TickerName, TickerSector,
};
pub use types::{PriceBar, PriceSeries};
