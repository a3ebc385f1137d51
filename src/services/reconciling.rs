use crate::domain::{GameListing, GameOffer, Platform};
use crate::services::text_utils::TitleNormalizer;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Groups canonical offers into listings, one slot per platform.
///
/// A listing key is resolved in this order:
/// 1. the configured alias for the offer's own key,
/// 2. the key an earlier offer with the same `(platform, external_id)` got,
/// 3. the offer's own key.
pub struct Reconciler {
    aliases: HashMap<String, String>,
    display_titles: HashMap<String, String>,
    external_ids: HashMap<(Platform, String), String>,
}

impl Reconciler {
    /// Alias and display-title keys go through the title key rule, so the
    /// config may spell them as plain titles.
    pub fn new(aliases: &HashMap<String, String>, display_titles: &HashMap<String, String>) -> Self {
        Self {
            aliases: aliases
                .iter()
                .map(|(from, to)| (TitleNormalizer::key(from), TitleNormalizer::key(to)))
                .filter(|(from, to)| from != to)
                .collect(),
            display_titles: display_titles
                .iter()
                .map(|(key, title)| (TitleNormalizer::key(key), title.clone()))
                .collect(),
            external_ids: HashMap::new(),
        }
    }

    /// Seeds the external-id index, typically from what the store already
    /// holds.
    pub fn with_external_ids(mut self, ids: HashMap<(Platform, String), String>) -> Self {
        self.external_ids.extend(ids);
        self
    }

    pub fn resolve_key(&self, offer: &GameOffer) -> String {
        self.resolve(offer.platform, &offer.title_key, offer.external_id.as_deref())
    }

    /// Listing key for a title key seen on `platform`, before any offer is
    /// built from it.
    pub fn resolve(
        &self,
        platform: Platform,
        title_key: &str,
        external_id: Option<&str>,
    ) -> String {
        if let Some(canonical) = self.aliases.get(title_key) {
            return canonical.clone();
        }
        external_id
            .and_then(|id| self.external_ids.get(&(platform, id.to_string())))
            .cloned()
            .unwrap_or_else(|| title_key.to_string())
    }

    /// Files `offer` under its resolved key and returns the listing it
    /// landed in. An existing slot for the same platform is replaced.
    pub fn reconcile<'a>(
        &mut self,
        listings: &'a mut BTreeMap<String, GameListing>,
        mut offer: GameOffer,
    ) -> &'a GameListing {
        let key = self.resolve_key(&offer);
        if key != offer.title_key {
            debug!(
                platform = %offer.platform,
                from = %offer.title_key,
                to = %key,
                "Offer re-keyed"
            );
        }
        offer.title_key.clone_from(&key);

        if let Some(id) = &offer.external_id {
            self.external_ids
                .insert((offer.platform, id.clone()), key.clone());
        }

        let display = self.display_titles.get(&key).cloned();
        let listing = match listings.entry(key) {
            Entry::Occupied(entry) => {
                let listing = entry.into_mut();
                listing.put_offer(offer);
                listing
            }
            Entry::Vacant(entry) => entry.insert(GameListing::new(offer)),
        };

        if let Some(title) = display {
            listing.title = title;
        }
        listing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Pricing;
    use chrono::Utc;

    fn offer(platform: Platform, title: &str, id: Option<&str>, price: i64) -> GameOffer {
        GameOffer {
            platform,
            title_key: TitleNormalizer::key(title),
            title: title.to_string(),
            external_id: id.map(str::to_string),
            pricing: Some(Pricing {
                original_price: price,
                discounted_price: price,
                discount_percent: 0,
            }),
            currency: "USD".to_string(),
            url: format!("https://{platform}.example/{price}"),
            last_seen: Utc::now(),
            stale: false,
            metadata: None,
        }
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(&HashMap::new(), &HashMap::new())
    }

    #[test]
    fn resolves_raw_keys_like_offers() {
        let aliases = HashMap::from([("Portal Two".to_string(), "Portal 2".to_string())]);
        let mut ids = HashMap::new();
        ids.insert((Platform::Gog, "1207".to_string()), "half-life-2".to_string());
        let reconciler = Reconciler::new(&aliases, &HashMap::new()).with_external_ids(ids);

        assert_eq!(reconciler.resolve(Platform::Steam, "portal-two", None), "portal-2");
        assert_eq!(
            reconciler.resolve(Platform::Gog, "half-life-2-update", Some("1207")),
            "half-life-2"
        );
        assert_eq!(
            reconciler.resolve(Platform::Steam, "half-life-2-update", Some("1207")),
            "half-life-2-update"
        );
    }

    #[test]
    fn same_offer_twice_keeps_one_slot() {
        let mut listings = BTreeMap::new();
        let mut reconciler = reconciler();

        reconciler.reconcile(&mut listings, offer(Platform::Steam, "Portal 2", Some("620"), 999));
        let listing =
            reconciler.reconcile(&mut listings, offer(Platform::Steam, "Portal 2", Some("620"), 199));

        assert_eq!(listing.offers.len(), 1);
        assert_eq!(
            listing.offer(Platform::Steam).unwrap().discounted_price(),
            Some(199)
        );
        assert_eq!(listings.len(), 1);
    }

    #[test]
    fn offers_from_two_platforms_share_a_listing() {
        let mut listings = BTreeMap::new();
        let mut reconciler = reconciler();

        reconciler.reconcile(&mut listings, offer(Platform::Gog, "Portal 2", None, 999));
        reconciler.reconcile(&mut listings, offer(Platform::Steam, "Portal 2", Some("620"), 999));

        let listing = &listings["portal-2"];
        assert_eq!(listing.offers.len(), 2);
        assert!(listing.offers.values().all(|o| o.title_key == "portal-2"));
        assert_eq!(listing.title, "Portal 2");
    }

    #[test]
    fn aliases_win_over_own_key() {
        let aliases = HashMap::from([(
            "Portal 2: Complete Pack".to_string(),
            "portal-2".to_string(),
        )]);
        let mut reconciler = Reconciler::new(&aliases, &HashMap::new());
        let mut listings = BTreeMap::new();

        let listing = reconciler.reconcile(
            &mut listings,
            offer(Platform::Nuuvem, "Portal 2: Complete Pack", None, 500),
        );
        assert_eq!(listing.title_key, "portal-2");
    }

    #[test]
    fn external_id_index_follows_renamed_titles() {
        let seeded = HashMap::from([((Platform::Steam, "620".to_string()), "portal-2".to_string())]);
        let mut reconciler = reconciler().with_external_ids(seeded);
        let mut listings = BTreeMap::new();

        let listing = reconciler.reconcile(
            &mut listings,
            offer(Platform::Steam, "Portal 2 (2011)", Some("620"), 999),
        );
        assert_eq!(listing.title_key, "portal-2");
        assert_eq!(listing.offer(Platform::Steam).unwrap().title_key, "portal-2");
    }

    #[test]
    fn first_title_wins_unless_overridden() {
        let mut listings = BTreeMap::new();
        let mut reconciler = reconciler();
        reconciler.reconcile(&mut listings, offer(Platform::Gog, "PORTAL 2", None, 1));
        reconciler.reconcile(&mut listings, offer(Platform::Steam, "Portal 2", None, 1));
        assert_eq!(listings["portal-2"].title, "PORTAL 2");

        let display = HashMap::from([("portal-2".to_string(), "Portal 2".to_string())]);
        let mut reconciler = Reconciler::new(&HashMap::new(), &display);
        let mut listings = BTreeMap::new();
        reconciler.reconcile(&mut listings, offer(Platform::Gog, "PORTAL 2", None, 1));
        assert_eq!(listings["portal-2"].title, "Portal 2");
    }
}
