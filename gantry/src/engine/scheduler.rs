//! Fair round-robin ordering over the connected client set.

/// Ordered set with a rotating cursor.
///
/// [`RoundRobin::round`] lists every member exactly once starting at the
/// cursor, in insertion order within the round; it does not mutate, so
/// repeated calls with no intervening mutation produce identical orders.
/// [`RoundRobin::rotate`] moves the cursor one position so the next round
/// starts with the following member, amortizing the first-served advantage.
#[derive(Debug)]
pub struct RoundRobin<T> {
    items: Vec<T>,
    cursor: usize,
}

impl<T: PartialEq + Clone> RoundRobin<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            cursor: 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    /// Appends `item`. No-op if already present.
    pub fn add(&mut self, item: T) {
        if !self.items.contains(&item) {
            self.items.push(item);
        }
    }

    /// Removes `item`. If the cursor pointed at it, the cursor lands on the
    /// next surviving member.
    pub fn remove(&mut self, item: &T) {
        let Some(position) = self.items.iter().position(|candidate| candidate == item) else {
            return;
        };
        self.items.remove(position);
        if position < self.cursor {
            self.cursor -= 1;
        }
        if !self.items.is_empty() {
            self.cursor %= self.items.len();
        } else {
            self.cursor = 0;
        }
    }

    /// Members in this round's visit order.
    #[must_use]
    pub fn round(&self) -> Vec<T> {
        let mut order = Vec::with_capacity(self.items.len());
        order.extend_from_slice(&self.items[self.cursor..]);
        order.extend_from_slice(&self.items[..self.cursor]);
        order
    }

    /// Advances the cursor one position (modulo set size).
    pub fn rotate(&mut self) {
        if !self.items.is_empty() {
            self.cursor = (self.cursor + 1) % self.items.len();
        }
    }
}

impl<T: PartialEq + Clone> Default for RoundRobin<T> {
    fn default() -> Self {
        Self::new()
    }
}
