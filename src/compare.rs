use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::location::Location;
use crate::reference::ConcreteState;
use crate::value::AbstractValue;

/// A definite bit of the abstract value that hardware disagrees with.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Mismatch {
    pub location: Location,
    pub concrete: u32,
    pub value: AbstractValue,
}

impl Mismatch {
    pub fn differing_bits(&self) -> u32 {
        self.value.differing_bits(self.concrete)
    }
}

/// Every mismatch of a single scenario.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Report {
    pub mismatches: Vec<Mismatch>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mismatches.len()
    }
}

/// Checks each of `values` against hardware state.
///
/// Only bits outside of the abstract value's unknown mask are compared, so an
/// imprecise but sound value never fails. All locations are checked even after
/// a mismatch has been found.
pub fn compare(
    concrete: &ConcreteState,
    values: &[(Location, AbstractValue)],
) -> Result<(), Report> {
    let mismatches = values.iter()
        .filter_map(|&(location, value)| {
            let concrete = concrete.value(location);
            if value.agrees_with(concrete) {
                None
            } else {
                debug!(
                    "{}: hardware {:x}, abstract {} (bits {:x} differ)",
                    location, concrete, value, value.differing_bits(concrete),
                );
                Some(Mismatch {
                    location,
                    concrete,
                    value,
                })
            }
        })
        .collect::<Vec<_>>();
    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(Report {
            mismatches,
        })
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let width = (self.value.bits() as usize + 3) / 4;
        writeln!(
            f,
            "- cpu   :  {} = {:0width$x}",
            self.location, self.concrete, width = width,
        )?;
        write!(
            f,
            "+ engine:  {} = {:0width$x}  {}",
            self.location, self.value.value(), self.value, width = width,
        )?;
        if !self.value.is_concrete() {
            write!(f, " [{}]", self.value.bit_string())?;
        }
        Ok(())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, mismatch) in self.mismatches.iter().enumerate() {
            if i != 0 {
                writeln!(f)?;
            }
            write!(f, "{}", mismatch)?;
        }
        Ok(())
    }
}
