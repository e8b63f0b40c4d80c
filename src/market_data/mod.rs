pub mod news;
pub mod series;
pub mod source;

pub use news::{NewsItem, NewsStore};
pub use series::{IngestReport, PriceBar, SeriesStore};
pub use source::{JsonFileSource, MarketDataSource, NewsSource};
