//! Outcome of a distance search.

/// Result of a distance search that did not fail.
///
/// `NotApplicable` means no geometric relationship was found (empty
/// candidate set, point outside the search window). Callers keep scanning
/// other candidates; it is neither a success nor an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distance {
    /// A finite normalised distance.
    Found(f32),
    /// No relationship found.
    NotApplicable,
}

impl Distance {
    /// The distance, if one was found.
    #[inline]
    #[must_use]
    pub fn value(self) -> Option<f32> {
        match self {
            Self::Found(distance) => Some(distance),
            Self::NotApplicable => None,
        }
    }

    /// True if a distance was found.
    #[inline]
    #[must_use]
    pub fn is_found(self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// The smaller of two outcomes; a found distance beats `NotApplicable`.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        match (self, other) {
            (Self::Found(a), Self::Found(b)) => Self::Found(a.min(b)),
            (Self::Found(_), Self::NotApplicable) => self,
            (Self::NotApplicable, _) => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min() {
        let found = Distance::Found(0.4);
        assert_eq!(found.min(Distance::Found(0.2)), Distance::Found(0.2));
        assert_eq!(found.min(Distance::NotApplicable), found);
        assert_eq!(Distance::NotApplicable.min(found), found);
        assert_eq!(
            Distance::NotApplicable.min(Distance::NotApplicable),
            Distance::NotApplicable
        );
        assert_eq!(found.value(), Some(0.4));
        assert!(!Distance::NotApplicable.is_found());
    }
}
