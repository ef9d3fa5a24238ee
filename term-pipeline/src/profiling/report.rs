//! Profile report types.

use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};

/// Detected data type for a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectedDataType {
    /// Boolean values (true/false)
    Boolean,
    /// Integer numbers
    Integer,
    /// Floating point and decimal numbers
    Double,
    /// Date values
    Date,
    /// Timestamp values
    Timestamp,
    /// String/text values
    String,
    /// Anything else
    Unknown,
}

impl DetectedDataType {
    pub fn from_arrow(data_type: &DataType) -> Self {
        match data_type {
            DataType::Boolean => DetectedDataType::Boolean,
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => DetectedDataType::Integer,
            DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _) => DetectedDataType::Double,
            DataType::Date32 | DataType::Date64 => DetectedDataType::Date,
            DataType::Timestamp(_, _) => DetectedDataType::Timestamp,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => DetectedDataType::String,
            _ => DetectedDataType::Unknown,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DetectedDataType::Integer | DetectedDataType::Double)
    }

    /// Columns that get a top-k frequency table.
    pub fn is_categorical(&self) -> bool {
        matches!(self, DetectedDataType::String | DetectedDataType::Boolean)
    }
}

/// One entry of a top-k frequency table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopValue {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Percentile {
    pub percentile: f64,
    pub value: f64,
}

/// Summary of the non-null values of a numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation; absent for fewer than two values
    pub std_dev: Option<f64>,
    pub percentiles: Vec<Percentile>,
}

/// Statistics of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub column: String,
    pub data_type: DetectedDataType,
    pub row_count: u64,
    pub null_count: Option<u64>,
    pub null_fraction: Option<f64>,
    pub distinct_count: Option<u64>,
    pub top_k: Option<Vec<TopValue>>,
    pub numeric: Option<NumericSummary>,
}

/// Pearson correlation between two numeric columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub left: String,
    pub right: String,
    /// Absent when either column is constant or fewer than two rows pair up
    pub coefficient: Option<f64>,
}

/// A statistic that could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OmittedStat {
    pub column: String,
    pub stat: String,
    pub reason: String,
}

/// Statistics of one slice of a table: all rows, or one group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSection {
    pub row_count: u64,
    pub columns: Vec<ColumnProfile>,
    pub correlations: Vec<Correlation>,
    pub omitted: Vec<OmittedStat>,
}

impl ProfileSection {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.column == name)
    }
}

/// Statistics for the rows sharing one group-by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupProfile {
    /// Key values, sanitized, in `group_by` order
    pub key: Vec<String>,
    #[serde(flatten)]
    pub profile: ProfileSection,
}

/// Profile of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileReport {
    pub pipeline_id: String,
    pub run_id: String,
    pub table: String,
    #[serde(flatten)]
    pub overall: ProfileSection,
    pub group_by: Vec<String>,
    /// Groups ordered by key
    pub groups: Vec<GroupProfile>,
}

impl ProfileReport {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.overall.column(name)
    }

    /// Omitted stats across the table and its groups.
    pub fn omitted_count(&self) -> usize {
        self.overall.omitted.len()
            + self
                .groups
                .iter()
                .map(|g| g.profile.omitted.len())
                .sum::<usize>()
    }
}
