//! Symbol Catalog
//!
//! Static table mapping each canonical symbol to the upstream identifiers
//! that may carry its price. Identifiers are tried in order: regular
//! (non-OTC) identifiers first, then OTC identifiers, each group keeping the
//! order it was declared in.
//!
//! The catalog is built once at startup and never mutated.

use std::collections::HashMap;

use serde::Serialize;

use super::quote::Symbol;

// =============================================================================
// Types
// =============================================================================

/// Conceptual grouping of catalog symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    /// Major currency pairs.
    Major,
    /// Cross currency pairs.
    Cross,
    /// Exotic currency pairs.
    Exotic,
    /// Metals and energy.
    Commodity,
    /// Crypto pairs.
    Crypto,
}

impl AssetClass {
    /// Get the asset class name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Cross => "cross",
            Self::Exotic => "exotic",
            Self::Commodity => "commodity",
            Self::Crypto => "crypto",
        }
    }
}

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    symbol: Symbol,
    asset_class: AssetClass,
    identifiers: Vec<String>,
}

impl SymbolEntry {
    /// Create an entry, ordering identifiers non-OTC first.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NoIdentifiers` if `identifiers` is empty.
    pub fn new(
        symbol: impl Into<Symbol>,
        asset_class: AssetClass,
        identifiers: Vec<String>,
    ) -> Result<Self, CatalogError> {
        let symbol = symbol.into();
        if identifiers.is_empty() {
            return Err(CatalogError::NoIdentifiers(symbol));
        }

        let (regular, otc): (Vec<String>, Vec<String>) = identifiers
            .into_iter()
            .partition(|id| !is_otc_identifier(id));

        Ok(Self {
            symbol,
            asset_class,
            identifiers: regular.into_iter().chain(otc).collect(),
        })
    }

    /// Canonical symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Asset class.
    #[must_use]
    pub const fn asset_class(&self) -> AssetClass {
        self.asset_class
    }

    /// Upstream identifiers in preference order.
    #[must_use]
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }
}

/// Whether an upstream identifier names an OTC instrument.
#[must_use]
pub fn is_otc_identifier(identifier: &str) -> bool {
    identifier.to_ascii_uppercase().contains("OTC")
}

// =============================================================================
// Catalog
// =============================================================================

/// Read-only symbol catalog.
#[derive(Debug, Clone)]
pub struct SymbolCatalog {
    entries: Vec<SymbolEntry>,
    index: HashMap<Symbol, usize>,
}

impl SymbolCatalog {
    /// Build a catalog from entries, preserving their order.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::DuplicateSymbol` if two entries share a symbol.
    pub fn new(entries: Vec<SymbolEntry>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if index.insert(entry.symbol.clone(), i).is_some() {
                return Err(CatalogError::DuplicateSymbol(entry.symbol.clone()));
            }
        }
        Ok(Self { entries, index })
    }

    /// The built-in catalog of 42 OTC symbols.
    #[must_use]
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(symbol, class, ids)| SymbolEntry {
                symbol: (*symbol).to_string(),
                asset_class: *class,
                identifiers: order_identifiers(ids),
            })
            .collect::<Vec<_>>();
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.symbol.clone(), i))
            .collect();
        Self { entries, index }
    }

    /// Look up an entry by canonical symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&SymbolEntry> {
        self.index.get(symbol).map(|&i| &self.entries[i])
    }

    /// Whether the catalog contains `symbol`.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.index.contains_key(symbol)
    }

    /// All entries in catalog order.
    #[must_use]
    pub fn entries(&self) -> &[SymbolEntry] {
        &self.entries
    }

    /// Number of symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in polling order: `priority` symbols first (in the given
    /// order, unknown and repeated names skipped), then the rest in
    /// catalog order.
    #[must_use]
    pub fn poll_order(&self, priority: &[Symbol]) -> Vec<&SymbolEntry> {
        let mut taken = vec![false; self.entries.len()];
        let mut ordered = Vec::with_capacity(self.entries.len());

        for symbol in priority {
            if let Some(&i) = self.index.get(symbol)
                && !taken[i]
            {
                taken[i] = true;
                ordered.push(&self.entries[i]);
            }
        }

        ordered.extend(
            self.entries
                .iter()
                .enumerate()
                .filter(|(i, _)| !taken[*i])
                .map(|(_, e)| e),
        );
        ordered
    }
}

fn order_identifiers(ids: &[&str]) -> Vec<String> {
    ids.iter()
        .filter(|id| !is_otc_identifier(id))
        .chain(ids.iter().filter(|id| is_otc_identifier(id)))
        .map(|id| (*id).to_string())
        .collect()
}

/// Catalog construction errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// Entry has no upstream identifiers.
    #[error("symbol {0} has no upstream identifiers")]
    NoIdentifiers(Symbol),
    /// Two entries share a canonical symbol.
    #[error("duplicate symbol {0}")]
    DuplicateSymbol(Symbol),
}

// =============================================================================
// Built-in Table
// =============================================================================

type Row = (&'static str, AssetClass, &'static [&'static str]);

const BUILTIN: &[Row] = &[
    // Majors
    ("EURUSD_otc", AssetClass::Major, &["EURUSD-OTC", "EURUSD"]),
    ("GBPUSD_otc", AssetClass::Major, &["GBPUSD-OTC", "GBPUSD"]),
    ("USDJPY_otc", AssetClass::Major, &["USDJPY-OTC", "USDJPY"]),
    ("AUDUSD_otc", AssetClass::Major, &["AUDUSD-OTC", "AUDUSD"]),
    ("USDCAD_otc", AssetClass::Major, &["USDCAD-OTC", "USDCAD"]),
    ("USDCHF_otc", AssetClass::Major, &["USDCHF-OTC", "USDCHF"]),
    ("NZDUSD_otc", AssetClass::Major, &["NZDUSD-OTC", "NZDUSD"]),
    // Crosses
    ("EURGBP_otc", AssetClass::Cross, &["EURGBP-OTC", "EURGBP"]),
    ("EURJPY_otc", AssetClass::Cross, &["EURJPY-OTC", "EURJPY"]),
    ("GBPJPY_otc", AssetClass::Cross, &["GBPJPY-OTC", "GBPJPY"]),
    ("AUDJPY_otc", AssetClass::Cross, &["AUDJPY-OTC", "AUDJPY"]),
    ("EURAUD_otc", AssetClass::Cross, &["EURAUD-OTC", "EURAUD"]),
    ("EURCAD_otc", AssetClass::Cross, &["EURCAD-OTC", "EURCAD"]),
    ("EURCHF_otc", AssetClass::Cross, &["EURCHF-OTC", "EURCHF"]),
    ("GBPAUD_otc", AssetClass::Cross, &["GBPAUD-OTC", "GBPAUD"]),
    ("GBPCAD_otc", AssetClass::Cross, &["GBPCAD-OTC", "GBPCAD"]),
    ("GBPCHF_otc", AssetClass::Cross, &["GBPCHF-OTC", "GBPCHF"]),
    ("AUDCAD_otc", AssetClass::Cross, &["AUDCAD-OTC", "AUDCAD"]),
    ("AUDCHF_otc", AssetClass::Cross, &["AUDCHF-OTC", "AUDCHF"]),
    ("CADJPY_otc", AssetClass::Cross, &["CADJPY-OTC", "CADJPY"]),
    ("CHFJPY_otc", AssetClass::Cross, &["CHFJPY-OTC", "CHFJPY"]),
    ("NZDJPY_otc", AssetClass::Cross, &["NZDJPY-OTC", "NZDJPY"]),
    // Exotics
    ("USDTRY_otc", AssetClass::Exotic, &["USDTRY-OTC", "USDTRY"]),
    ("USDZAR_otc", AssetClass::Exotic, &["USDZAR-OTC", "USDZAR"]),
    ("USDMXN_otc", AssetClass::Exotic, &["USDMXN-OTC", "USDMXN"]),
    ("USDSGD_otc", AssetClass::Exotic, &["USDSGD-OTC", "USDSGD"]),
    ("USDHKD_otc", AssetClass::Exotic, &["USDHKD-OTC", "USDHKD"]),
    ("USDNOK_otc", AssetClass::Exotic, &["USDNOK-OTC", "USDNOK"]),
    ("USDSEK_otc", AssetClass::Exotic, &["USDSEK-OTC", "USDSEK"]),
    ("EURTRY_otc", AssetClass::Exotic, &["EURTRY-OTC", "EURTRY"]),
    // Metals and energy
    ("XAUUSD_otc", AssetClass::Commodity, &["XAUUSD-OTC", "XAUUSD", "GOLD"]),
    ("XAGUSD_otc", AssetClass::Commodity, &["XAGUSD-OTC", "XAGUSD", "SILVER"]),
    ("XPTUSD_otc", AssetClass::Commodity, &["XPTUSD-OTC", "XPTUSD"]),
    ("USOIL_otc", AssetClass::Commodity, &["USOUSD-OTC", "USOUSD", "USOIL"]),
    ("UKOIL_otc", AssetClass::Commodity, &["UKOUSD-OTC", "UKOUSD", "UKOIL"]),
    // Crypto
    ("BTCUSD_otc", AssetClass::Crypto, &["BTCUSD-OTC", "BTCUSD"]),
    ("ETHUSD_otc", AssetClass::Crypto, &["ETHUSD-OTC", "ETHUSD"]),
    ("LTCUSD_otc", AssetClass::Crypto, &["LTCUSD-OTC", "LTCUSD"]),
    ("XRPUSD_otc", AssetClass::Crypto, &["XRPUSD-OTC", "XRPUSD"]),
    ("BCHUSD_otc", AssetClass::Crypto, &["BCHUSD-OTC", "BCHUSD"]),
    ("SOLUSD_otc", AssetClass::Crypto, &["SOLUSD-OTC", "SOLUSD"]),
    ("ADAUSD_otc", AssetClass::Crypto, &["ADAUSD-OTC", "ADAUSD"]),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(symbol: &str, ids: &[&str]) -> SymbolEntry {
        SymbolEntry::new(
            symbol,
            AssetClass::Major,
            ids.iter().map(|s| (*s).to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn builtin_has_42_unique_symbols() {
        let catalog = SymbolCatalog::builtin();
        assert_eq!(catalog.len(), 42);
        assert!(SymbolCatalog::new(catalog.entries().to_vec()).is_ok());
    }

    #[test]
    fn builtin_entries_are_non_empty_and_ordered() {
        let catalog = SymbolCatalog::builtin();
        for e in catalog.entries() {
            assert!(!e.identifiers().is_empty(), "{} has no ids", e.symbol());
            let first_otc = e.identifiers().iter().position(|id| is_otc_identifier(id));
            if let Some(pos) = first_otc {
                assert!(
                    e.identifiers()[pos..].iter().all(|id| is_otc_identifier(id)),
                    "{} has a regular id after an OTC id",
                    e.symbol()
                );
            }
        }
        let eurusd = catalog.get("EURUSD_otc").unwrap();
        assert_eq!(eurusd.identifiers(), ["EURUSD", "EURUSD-OTC"]);
    }

    #[test]
    fn regular_identifiers_come_first_preserving_order() {
        let e = entry("X_otc", &["A-OTC", "A", "B-otc", "B"]);
        assert_eq!(e.identifiers(), ["A", "B", "A-OTC", "B-otc"]);
    }

    #[test]
    fn empty_identifiers_rejected() {
        let result = SymbolEntry::new("X", AssetClass::Crypto, vec![]);
        assert_eq!(result, Err(CatalogError::NoIdentifiers("X".to_string())));
    }

    #[test]
    fn duplicate_symbol_rejected() {
        let result = SymbolCatalog::new(vec![entry("A", &["A"]), entry("A", &["B"])]);
        assert!(matches!(result, Err(CatalogError::DuplicateSymbol(s)) if s == "A"));
    }

    #[test]
    fn poll_order_puts_priority_first() {
        let catalog = SymbolCatalog::new(vec![
            entry("A", &["a"]),
            entry("B", &["b"]),
            entry("C", &["c"]),
            entry("D", &["d"]),
        ])
        .unwrap();

        let priority = vec!["C".to_string(), "UNKNOWN".to_string(), "C".to_string(), "A".to_string()];
        let order: Vec<&str> = catalog
            .poll_order(&priority)
            .into_iter()
            .map(SymbolEntry::symbol)
            .collect();
        assert_eq!(order, ["C", "A", "B", "D"]);
    }

    #[test]
    fn lookup() {
        let catalog = SymbolCatalog::builtin();
        assert!(catalog.contains("BTCUSD_otc"));
        assert!(!catalog.contains("UNKNOWN_otc"));
        assert_eq!(
            catalog.get("XAUUSD_otc").unwrap().asset_class(),
            AssetClass::Commodity
        );
    }
}
