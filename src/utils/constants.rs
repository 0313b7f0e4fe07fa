/// Remote source
pub const DEFAULT_BASE_URL: &str = "https://quotsoft.net/air/data";
pub const FILE_PREFIX: &str = "china_cities_";
pub const FILE_EXTENSION: &str = ".csv";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Table names
pub const LEGACY_TABLE: &str = "air_quality_data";
pub const TARGET_TABLE: &str = "air_quality_newdata";
pub const IMPORT_LOG_TABLE: &str = "import_logs";

/// Required CSV columns, canonical and localized
pub const REQUIRED_COLUMNS: [&str; 3] = ["date", "hour", "type"];
pub const REQUIRED_COLUMNS_LOCALIZED: [&str; 3] = ["日期", "小时", "类型"];

/// Suffix stripped from city names for fuzzy column matching
pub const CITY_SUFFIX: char = '市';

/// Target region defaults
pub const DEFAULT_PROVINCE: &str = "广东省";
pub const DEFAULT_CITIES: [&str; 21] = [
    "广州市", "深圳市", "珠海市", "汕头市", "佛山市", "韶关市", "湛江市", "肇庆市", "江门市",
    "茂名市", "惠州市", "梅州市", "汕尾市", "河源市", "阳江市", "清远市", "东莞市", "中山市",
    "潮州市", "揭阳市", "云浮市",
];

/// Text encodings tried in order when decoding a daily file
pub const DEFAULT_ENCODINGS: [&str; 4] = ["utf-8", "gbk", "gb2312", "cp936"];

/// Processing defaults
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_DOWNLOAD_WORKERS: usize = 5;
pub const MAX_CITY_WORKERS: usize = 10;
pub const DEFAULT_MAX_TOTAL_WORKERS: usize = 256;
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;
pub const PROGRESS_FLUSH_THRESHOLD: usize = 10;

/// Retry defaults
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// File names
pub const PROGRESS_FILE: &str = "progress.json";
pub const LOG_FILE: &str = "airq-ingest.log";
pub const DEFAULT_CONFIG_FILE: &str = "airq.toml";
