use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Instrument type of a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentType {
    Stock,
    Etf,
    MutualFund,
    Index,
}

impl InstrumentType {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "stock" => Ok(InstrumentType::Stock),
            "etf" => Ok(InstrumentType::Etf),
            "mutual_fund" | "mutual-fund" => Ok(InstrumentType::MutualFund),
            "index" => Ok(InstrumentType::Index),
            _ => Err(format!("Invalid instrument type: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentType::Stock => "stock",
            InstrumentType::Etf => "etf",
            InstrumentType::MutualFund => "mutual_fund",
            InstrumentType::Index => "index",
        }
    }
}

impl From<InstrumentType> for String {
    fn from(instrument_type: InstrumentType) -> Self {
        instrument_type.as_str().to_string()
    }
}

/// Symbol model for a tradable instrument that users can watch
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Symbol {
    pub id: i64,
    pub ticker: String,
    pub name: String,
    pub instrument_type: String, // Stored as TEXT, use InstrumentType for type safety
    pub exchange: String,
    pub updated_at: DateTime<Utc>,
}

impl Symbol {
    /// Create a new Symbol
    pub fn new(
        id: i64,
        ticker: impl Into<String>,
        name: impl Into<String>,
        instrument_type: InstrumentType,
        exchange: impl Into<String>,
    ) -> Self {
        Self {
            id,
            ticker: ticker.into(),
            name: name.into(),
            instrument_type: instrument_type.as_str().to_string(),
            exchange: exchange.into(),
            updated_at: Utc::now(),
        }
    }

    /// Get instrument type as an enum
    pub fn instrument_type_enum(&self) -> InstrumentType {
        InstrumentType::from_str(&self.instrument_type).unwrap_or(InstrumentType::Stock)
    }
}

/// Symbol listing as read from an exchange directory, before it has an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolListing {
    pub ticker: String,
    pub name: String,
    pub instrument_type: InstrumentType,
    pub exchange: String,
}
