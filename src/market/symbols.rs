//! Exchange symbol directory from NASDAQ Trader's pipe-delimited files.

use super::DataError;
use crate::models::{InstrumentType, SymbolListing};
use std::time::Duration;
use tracing::{info, warn};

pub const NASDAQ_LISTED_URL: &str = "https://www.nasdaqtrader.com/dynamic/symdir/nasdaqlisted.txt";
pub const OTHER_LISTED_URL: &str = "https://www.nasdaqtrader.com/dynamic/symdir/otherlisted.txt";

/// Downloads and parses the listed-symbol files
pub struct SymbolDirectory {
    client: reqwest::Client,
    nasdaq_url: String,
    other_url: String,
}

impl SymbolDirectory {
    pub fn new() -> Result<Self, DataError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DataError::Transient(e.to_string()))?;

        Ok(Self {
            client,
            nasdaq_url: NASDAQ_LISTED_URL.to_string(),
            other_url: OTHER_LISTED_URL.to_string(),
        })
    }

    pub fn with_urls(mut self, nasdaq_url: impl Into<String>, other_url: impl Into<String>) -> Self {
        self.nasdaq_url = nasdaq_url.into();
        self.other_url = other_url.into();
        self
    }

    async fn download(&self, url: &str) -> Result<String, DataError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DataError::Transient(format!("{} returned HTTP {}", url, status)));
        }
        Ok(response.text().await?)
    }

    /// Fetch both files. A file that fails to download is skipped; the call
    /// only fails when neither source produced listings.
    pub async fn fetch_all(&self) -> Result<Vec<SymbolListing>, DataError> {
        let mut listings = Vec::new();
        let mut last_error = None;

        type Parser = fn(&str) -> Vec<SymbolListing>;
        let sources = [
            (self.nasdaq_url.as_str(), parse_nasdaq_listed as Parser),
            (self.other_url.as_str(), parse_other_listed as Parser),
        ];

        for (url, parse) in sources {
            match self.download(url).await {
                Ok(text) => {
                    let parsed = parse(&text);
                    info!(url, count = parsed.len(), "Parsed symbol file");
                    listings.extend(parsed);
                }
                Err(e) => {
                    warn!(url, error = %e, "Symbol file download failed");
                    last_error = Some(e);
                }
            }
        }

        match (listings.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(listings),
        }
    }
}

/// Data rows of a pipe-delimited file: header and trailer dropped
fn rows(text: &str) -> impl Iterator<Item = Vec<&str>> + '_ {
    text.lines()
        .skip(1)
        .filter(|line| !line.starts_with("File Creation Time") && !line.trim().is_empty())
        .map(|line| line.split('|').map(str::trim).collect())
}

fn flag(parts: &[&str], index: usize) -> bool {
    parts.get(index).map_or(false, |v| *v == "Y")
}

fn instrument(is_etf: bool) -> InstrumentType {
    if is_etf {
        InstrumentType::Etf
    } else {
        InstrumentType::Stock
    }
}

/// `Symbol|Security Name|Market Category|Test Issue|Financial Status|Round Lot Size|ETF|NextShares`
pub fn parse_nasdaq_listed(text: &str) -> Vec<SymbolListing> {
    rows(text)
        .filter(|parts| parts.len() >= 2 && !parts[0].is_empty() && !flag(parts, 3))
        .map(|parts| SymbolListing {
            ticker: parts[0].to_string(),
            name: parts[1].to_string(),
            instrument_type: instrument(flag(&parts, 6)),
            exchange: "NASDAQ".to_string(),
        })
        .collect()
}

/// `ACT Symbol|Security Name|Exchange|CQS Symbol|ETF|Round Lot Size|Test Issue|NASDAQ Symbol`
pub fn parse_other_listed(text: &str) -> Vec<SymbolListing> {
    rows(text)
        .filter(|parts| parts.len() >= 3 && !parts[0].is_empty() && !flag(parts, 6))
        .map(|parts| SymbolListing {
            ticker: parts[0].to_string(),
            name: parts[1].to_string(),
            instrument_type: instrument(flag(&parts, 4)),
            exchange: exchange_name(parts[2]).to_string(),
        })
        .collect()
}

fn exchange_name(code: &str) -> &str {
    match code {
        "A" => "NYSE American",
        "N" | "" => "NYSE",
        "P" => "NYSE Arca",
        "Z" => "Cboe BZX",
        "V" => "IEX",
        other => other,
    }
}
