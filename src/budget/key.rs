//! `BudgetKey`: identity of a rate-limited resource. See spec §3.

/// Identity of a rate-limited resource. Immutable per request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BudgetKey {
    /// Opaque UTF-8 string supplied by the client.
    pub name: String,
    /// Derived from the authorized domain or an override header.
    pub reporting_origin: String,
}

impl BudgetKey {
    pub fn new(reporting_origin: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            reporting_origin: reporting_origin.into(),
            name: name.into(),
        }
    }

    pub fn canonical_name(&self) -> String {
        format!("{}/{}", self.reporting_origin, self.name)
    }
}
