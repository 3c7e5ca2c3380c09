use resinstock_core::{LocationCode, ProductId};
use resinstock_inventory::{LoggedMovement, MovementReference, MovementType};

/// Filter over the movement log. Empty filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementQuery {
    pub product_id: Option<ProductId>,
    pub location: Option<LocationCode>,
    pub movement_type: Option<MovementType>,
    pub reference: Option<MovementReference>,
    /// Only movements with a sequence number strictly greater than this.
    pub after_sequence: Option<u64>,
    pub limit: Option<usize>,
}

impl MovementQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn product(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn location(mut self, location: impl Into<LocationCode>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn of_type(mut self, movement_type: MovementType) -> Self {
        self.movement_type = Some(movement_type);
        self
    }

    pub fn reference(mut self, reference: MovementReference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn after(mut self, sequence_number: u64) -> Self {
        self.after_sequence = Some(sequence_number);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, logged: &LoggedMovement) -> bool {
        let m = &logged.movement;
        self.product_id.is_none_or(|p| m.product_id == p)
            && self.location.as_ref().is_none_or(|l| m.location == *l)
            && self.movement_type.is_none_or(|t| m.movement_type == t)
            && self.reference.is_none_or(|r| m.reference == r)
            && self.after_sequence.is_none_or(|s| logged.sequence_number > s)
    }
}
