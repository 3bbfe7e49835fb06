//! Attribution for the data currently on screen.

use std::collections::BTreeSet;

use crate::provider::Credit;

/// Deduplicated credits, in a stable order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreditSet {
    credits: BTreeSet<Credit>,
}

impl CreditSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, credits: impl IntoIterator<Item = Credit>) {
        self.credits.extend(credits);
    }

    pub fn contains_text(&self, text: &str) -> bool {
        self.credits.iter().any(|credit| credit.text == text)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credit> {
        self.credits.iter()
    }

    /// Credits to show on screen rather than in a separate listing.
    pub fn on_screen(&self) -> impl Iterator<Item = &Credit> {
        self.credits.iter().filter(|credit| credit.show_on_screen)
    }

    pub fn len(&self) -> usize {
        self.credits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credits.is_empty()
    }
}
