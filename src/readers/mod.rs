pub mod city_matcher;
pub mod daily_file;
pub mod decoder;

pub use city_matcher::{match_city, CityColumn, CityColumnCache};
pub use daily_file::{CityDayRecords, DailyFileParser, ParseStats};
pub use decoder::TextDecoder;
