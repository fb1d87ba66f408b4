//! Typed graph state with per-field merge policies.
//!
//! A graph's state is a plain struct. Every field carries a [`MergePolicy`]:
//! `overwrite` fields are replaced by the latest update that sets them,
//! `append` fields accumulate every update's values in merge order. Node
//! handlers never mutate state; they return a partial update that the
//! executor merges.
//!
//! [`graph_state!`](crate::graph_state) declares the state struct, its update
//! struct, and the [`GraphState`] impl in one place:
//!
//! ```
//! use convograph_engine::graph_state;
//! use convograph_engine::state::{GraphState, MergePolicy};
//!
//! graph_state! {
//!     pub struct Notes => NotesUpdate {
//!         overwrite title: String,
//!         append lines: String,
//!     }
//! }
//!
//! let mut notes = Notes::default();
//! notes.merge(NotesUpdate { title: Some("a".into()), lines: vec!["x".into()] });
//! notes.merge(NotesUpdate { title: None, lines: vec!["y".into()] });
//! assert_eq!(notes.title, "a");
//! assert_eq!(notes.lines, ["x", "y"]);
//! assert_eq!(Notes::policy_of("lines"), Some(MergePolicy::Append));
//! ```

use serde::Serialize;

/// How an update value combines with the current field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    Overwrite,
    Append,
}

/// Name and policy of one state field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub policy: MergePolicy,
}

/// State carried through a graph run.
///
/// `Serialize` is required so failing runs can report a state snapshot.
pub trait GraphState: Clone + Default + Serialize + Send + Sync + 'static {
    /// Partial update returned by node handlers. `Default` is the empty
    /// update that changes nothing.
    type Update: Default + Send + 'static;

    /// Declared fields in order.
    const FIELDS: &'static [FieldSpec];

    /// Apply `update` field by field according to each field's policy.
    fn merge(&mut self, update: Self::Update);

    fn policy_of(name: &str) -> Option<MergePolicy> {
        Self::FIELDS
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.policy)
    }
}

/// Declare a [`GraphState`] struct and its update struct.
///
/// `overwrite name: T` produces a `T` field in the state and an `Option<T>`
/// in the update. `append name: T` produces a `Vec<T>` in both.
#[macro_export]
macro_rules! graph_state {
    (@state overwrite $ty:ty) => { $ty };
    (@state append $ty:ty) => { ::std::vec::Vec<$ty> };
    (@update overwrite $ty:ty) => { ::std::option::Option<$ty> };
    (@update append $ty:ty) => { ::std::vec::Vec<$ty> };
    (@policy overwrite) => { $crate::state::MergePolicy::Overwrite };
    (@policy append) => { $crate::state::MergePolicy::Append };
    (@merge overwrite $target:expr, $value:expr) => {
        if let ::std::option::Option::Some(value) = $value {
            $target = value;
        }
    };
    (@merge append $target:expr, $value:expr) => {
        $target.extend($value)
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident => $update:ident {
            $(
                $(#[$field_meta:meta])*
                $policy:ident $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
        #[serde(default)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field: $crate::graph_state!(@state $policy $ty),
            )*
        }

        #[doc = concat!("Partial update for [`", stringify!($name), "`].")]
        #[derive(Debug, Default)]
        $vis struct $update {
            $( pub $field: $crate::graph_state!(@update $policy $ty), )*
        }

        impl $crate::state::GraphState for $name {
            type Update = $update;

            const FIELDS: &'static [$crate::state::FieldSpec] = &[
                $(
                    $crate::state::FieldSpec {
                        name: stringify!($field),
                        policy: $crate::graph_state!(@policy $policy),
                    },
                )*
            ];

            fn merge(&mut self, update: Self::Update) {
                $( $crate::graph_state!(@merge $policy self.$field, update.$field); )*
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    crate::graph_state! {
        /// Test state.
        struct Counter => CounterUpdate {
            overwrite label: String,
            overwrite count: u32,
            append seen: u32,
        }
    }

    #[test]
    fn overwrite_takes_last_set_value() {
        let mut state = Counter::default();
        state.merge(CounterUpdate {
            label: Some("first".into()),
            count: Some(1),
            ..Default::default()
        });
        state.merge(CounterUpdate {
            count: Some(2),
            ..Default::default()
        });
        assert_eq!(state.label, "first");
        assert_eq!(state.count, 2);
    }

    #[test]
    fn append_accumulates_in_merge_order() {
        let mut state = Counter::default();
        for batch in [vec![1, 2], vec![], vec![3]] {
            state.merge(CounterUpdate {
                seen: batch,
                ..Default::default()
            });
        }
        assert_eq!(state.seen, vec![1, 2, 3]);
    }

    #[test]
    fn empty_update_is_identity() {
        let mut state = Counter {
            label: "x".into(),
            count: 7,
            seen: vec![1],
        };
        state.merge(CounterUpdate::default());
        assert_eq!(state.label, "x");
        assert_eq!(state.count, 7);
        assert_eq!(state.seen, vec![1]);
    }

    #[test]
    fn policies_are_declared_in_order() {
        let names: Vec<_> = Counter::FIELDS.iter().map(|f| f.name).collect();
        assert_eq!(names, ["label", "count", "seen"]);
        assert_eq!(Counter::policy_of("count"), Some(MergePolicy::Overwrite));
        assert_eq!(Counter::policy_of("seen"), Some(MergePolicy::Append));
        assert_eq!(Counter::policy_of("missing"), None);
    }
}
