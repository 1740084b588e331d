//! Presentation-facing view of a record

use crate::error::QueryError;
use crate::record::{QueryStatus, Record};

/// What a view should render for a query
#[derive(Debug, Clone)]
pub enum QueryPhase<T> {
    Idle,
    Loading,
    Success(T),
    Error(QueryError),
}

impl<T> Default for QueryPhase<T> {
    fn default() -> Self {
        Self::Idle
    }
}

impl<T: Clone> QueryPhase<T> {
    /// Phase of a typed record
    ///
    /// A success record without data reads as a type mismatch and an error
    /// record without an error as [`QueryError::MissingError`].
    pub fn from_record(record: &Record<T>) -> Self {
        match record.status {
            QueryStatus::Idle => Self::Idle,
            QueryStatus::Loading => Self::Loading,
            QueryStatus::Success => match &record.data {
                Some(data) => Self::Success(data.clone()),
                None => Self::Error(QueryError::type_mismatch::<T>()),
            },
            QueryStatus::Error => {
                Self::Error(record.error.clone().unwrap_or(QueryError::MissingError))
            }
        }
    }
}

/// Phase wrapper with convenience accessors
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    pub phase: QueryPhase<T>,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self::new(QueryPhase::Idle)
    }
}

impl<T> QueryState<T> {
    pub fn new(phase: QueryPhase<T>) -> Self {
        Self { phase }
    }

    /// Payload, only in the success phase
    pub fn data(&self) -> Option<&T> {
        match &self.phase {
            QueryPhase::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Failure, only in the error phase
    pub fn error(&self) -> Option<&QueryError> {
        match &self.phase {
            QueryPhase::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, QueryPhase::Loading)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, QueryPhase::Idle)
    }
}

impl<T> From<QueryPhase<T>> for QueryState<T> {
    fn from(phase: QueryPhase<T>) -> Self {
        Self::new(phase)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    /// Validates each status maps to its phase.
    #[test]
    fn test_phase_from_record() {
        let now = SystemTime::now();

        let idle: Record<u32> = Record::idle();
        assert!(matches!(QueryPhase::from_record(&idle), QueryPhase::Idle));

        let loading = Record::loading_from(Some(&Record::success(1, now, 0)), now);
        assert!(matches!(QueryPhase::from_record(&loading), QueryPhase::Loading));

        let success = Record::success(9, now, 0);
        assert!(matches!(QueryPhase::from_record(&success), QueryPhase::Success(9)));

        let failed: Record<u32> = Record::failure(QueryError::fetch_message("down"), now, 0);
        let state = QueryState::from(QueryPhase::from_record(&failed));
        assert_eq!(state.error().map(ToString::to_string), Some("down".to_string()));
    }

    /// Validates malformed records degrade to typed errors.
    #[test]
    fn test_malformed_records() {
        let mut record: Record<u32> = Record::idle();
        record.status = QueryStatus::Error;
        assert!(matches!(QueryPhase::from_record(&record), QueryPhase::Error(QueryError::MissingError)));

        record.status = QueryStatus::Success;
        record.updated_at = UNIX_EPOCH;
        assert!(matches!(
            QueryPhase::from_record(&record),
            QueryPhase::Error(QueryError::TypeMismatch { .. })
        ));
    }

    /// Validates the state accessors.
    #[test]
    fn test_state_accessors() {
        let state = QueryState::new(QueryPhase::Success("v"));
        assert_eq!(state.data(), Some(&"v"));
        assert!(state.error().is_none());
        assert!(!state.is_loading());

        let loading: QueryState<&str> = QueryState::new(QueryPhase::Loading);
        assert!(loading.is_loading());
        assert!(loading.data().is_none());
        assert!(QueryState::<u8>::default().is_idle());
    }
}
