use crate::domain::{GameMetadata, GameOffer, Platform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All offers for one logical game, one slot per platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameListing {
    pub title_key: String,
    pub title: String,
    pub offers: BTreeMap<Platform, GameOffer>,
    /// Latest store metadata any offer carried.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<GameMetadata>,
    /// Managed by the store; bumped on every write.
    #[serde(default)]
    pub revision: u64,
}

impl GameListing {
    pub fn new(offer: GameOffer) -> Self {
        let mut offers = BTreeMap::new();
        let title_key = offer.title_key.clone();
        let title = offer.title.clone();
        let metadata = offer.metadata.clone();
        offers.insert(offer.platform, offer);

        Self {
            title_key,
            title,
            offers,
            metadata,
            revision: 0,
        }
    }

    /// Replaces the slot for the offer's platform and returns the previous
    /// occupant. The offer is re-keyed to this listing.
    pub fn put_offer(&mut self, mut offer: GameOffer) -> Option<GameOffer> {
        offer.title_key.clone_from(&self.title_key);
        if offer.metadata.is_some() {
            self.metadata.clone_from(&offer.metadata);
        }
        self.offers.insert(offer.platform, offer)
    }

    /// Platform-level replace-or-insert of every slot in `other`.
    /// Slots `other` does not carry are left untouched.
    pub fn merge_offers(&mut self, other: &GameListing) {
        for offer in other.offers.values() {
            self.put_offer(offer.clone());
        }
    }

    pub fn offer(&self, platform: Platform) -> Option<&GameOffer> {
        self.offers.get(&platform)
    }

    /// Cheapest offer that is currently available.
    pub fn best_offer(&self) -> Option<&GameOffer> {
        self.offers
            .values()
            .filter(|o| o.is_available())
            .min_by_key(|o| o.discounted_price())
    }

    /// Equality ignoring the store-managed revision.
    pub fn same_content(&self, other: &GameListing) -> bool {
        self.title_key == other.title_key
            && self.title == other.title
            && self.offers == other.offers
            && self.metadata == other.metadata
    }
}
