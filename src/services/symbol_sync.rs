use crate::error::AppResult;
use crate::market::SymbolDirectory;
use crate::models::SymbolListing;
use crate::repositories::SymbolRepository;
use std::collections::HashSet;
use tracing::info;

/// Refreshes the symbols table from the exchange directory
pub struct SymbolSyncService {
    directory: SymbolDirectory,
    symbols: std::sync::Arc<SymbolRepository>,
}

impl SymbolSyncService {
    pub fn new(directory: SymbolDirectory, symbols: std::sync::Arc<SymbolRepository>) -> Self {
        Self { directory, symbols }
    }

    /// Download, de-duplicate and upsert. Returns the number of rows written.
    pub async fn sync(&self) -> AppResult<u64> {
        let listings = dedupe(self.directory.fetch_all().await?);
        info!(count = listings.len(), "Syncing symbols");

        let written = self.symbols.bulk_upsert(&listings).await?;
        info!(written, "Symbol sync complete");
        Ok(written)
    }
}

/// Keep the first listing per ticker (NASDAQ file wins over the other file)
pub fn dedupe(listings: Vec<SymbolListing>) -> Vec<SymbolListing> {
    let mut seen = HashSet::new();
    listings
        .into_iter()
        .filter(|listing| seen.insert(listing.ticker.to_uppercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InstrumentType;

    fn listing(ticker: &str, exchange: &str) -> SymbolListing {
        SymbolListing {
            ticker: ticker.to_string(),
            name: ticker.to_string(),
            instrument_type: InstrumentType::Stock,
            exchange: exchange.to_string(),
        }
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let out = dedupe(vec![
            listing("AAPL", "NASDAQ"),
            listing("IBM", "NYSE"),
            listing("aapl", "NYSE"),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].exchange, "NASDAQ");
    }
}
