//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values: a
/// `StockLevel { quantity: 10, unit: bag, total_kg: 250 }` is equal to any other level
/// with the same numbers, wherever it came from. To "modify" one, build a new value.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
