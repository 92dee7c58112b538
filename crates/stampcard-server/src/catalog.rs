//! Offer designs keyed by offer id.

use std::collections::HashMap;

use stampcard_core::config::{Config, OfferDesign};

#[derive(Debug, Clone, Default)]
pub struct OfferCatalog {
    offers: HashMap<String, OfferDesign>,
}

impl OfferCatalog {
    pub fn from_config(config: &Config) -> Self {
        Self {
            offers: config.offers.clone(),
        }
    }

    pub fn insert(&mut self, offer_id: impl Into<String>, design: OfferDesign) {
        self.offers.insert(offer_id.into(), design);
    }

    /// Design for `offer_id`, or the default design.
    pub fn design_for(&self, offer_id: &str) -> OfferDesign {
        self.offers.get(offer_id).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_offer_uses_default() {
        let mut catalog = OfferCatalog::default();
        catalog.insert("coffee", OfferDesign {
            icon_id: "coffee".into(),
            ..OfferDesign::default()
        });
        assert_eq!(catalog.design_for("coffee").icon_id, "coffee");
        assert_eq!(catalog.design_for("tea"), OfferDesign::default());
        assert_eq!(catalog.len(), 1);
    }
}
