use crate::graph::{Slot, StateNode};
use crate::location::Location;
use crate::value::AbstractValue;
use crate::Error;

/// Reads the value of `location` from `node`.
///
/// Register locations of any width resolve to the full 32-bit register;
/// narrowing is the engine's concern. Flags resolve to a one-bit value, either
/// from the flag's own slot or from its bit in the packed eflags slot.
pub fn extract(node: &StateNode, location: Location) -> Result<AbstractValue, Error> {
    let value = match location {
        Location::Register(reg, _) => node.get(Slot::Register(reg)),
        Location::Flag(flag) => node.get(Slot::Flag(flag))
            .or_else(|| node.get(Slot::Flags).map(|word| word.bit(flag.bit_offset()))),
    };
    value.ok_or_else(|| Error::NotTracked(node.id, location))
}

/// Values for each of `locations`, in the same order.
pub fn extract_all(
    node: &StateNode,
    locations: &[Location],
) -> Result<Vec<(Location, AbstractValue)>, Error> {
    locations.iter()
        .map(|&loc| extract(node, loc).map(|val| (loc, val)))
        .collect()
}
