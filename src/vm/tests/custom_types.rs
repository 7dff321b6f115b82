//! Custom type tests
//!
//! Type id issuance, lazy module-global data and payload lifetime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::runtime::module::Module;
use crate::runtime::value::{custom_data, CustomValue, Value};
use crate::vm::errors::{RuntimeError, RuntimeState};
use crate::vm::executor::ExecutionContext;

/// Increments a shared counter when dropped
struct DropGuard(Arc<AtomicUsize>);

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

mod type_id_tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_monotone() {
        let mut module = Module::new();
        let a = module.bind_custom_type("Lex", None);
        let b = module.bind_custom_type("Chan", None);
        let c = module.bind_custom_type("Lex", None);
        assert!(a < b && b < c);
        assert_eq!(module.custom_type(a).map(|t| t.name.as_str()), Some("Lex"));
        assert_eq!(module.custom_type(c).map(|t| t.name.as_str()), Some("Lex"));
    }
}

mod global_data_tests {
    use super::*;

    #[test]
    fn test_factory_runs_once() {
        let mut module = Module::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let type_id = module.bind_custom_type(
            "Lex",
            Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                custom_data(Vec::<i64>::new())
            })),
        );

        let ctx = ExecutionContext::new(&module);
        let first = ctx.custom_type_global_data(type_id).unwrap();
        let second = ctx.custom_type_global_data(type_id).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_unknown_type_id() {
        let module = Module::new();
        let ctx = ExecutionContext::new(&module);
        let err = ctx.custom_type_global_data(7).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::InvalidCustomTypeHandle { type_id: 7 }
        ));
        assert_eq!(err.state(), RuntimeState::InvalidCustomTypeHandle);
    }

    #[test]
    fn test_type_without_factory() {
        let mut module = Module::new();
        let type_id = module.bind_custom_type("Bare", None);
        let ctx = ExecutionContext::new(&module);
        let err = ctx.custom_type_global_data(type_id).unwrap_err();
        assert!(matches!(err, RuntimeError::NoCustomTypeData { .. }));
    }
}

mod payload_lifetime_tests {
    use super::*;

    /// One deleter run per instance payload, when its last holder drops
    #[test]
    fn test_instance_data_dropped_once_per_value() {
        let mut module = Module::new();
        let type_id = module.bind_custom_type("Lex", None);

        let drops = Arc::new(AtomicUsize::new(0));
        let a = Value::Custom(CustomValue::with_data(
            type_id,
            custom_data(DropGuard(drops.clone())),
        ));
        let b = Value::Custom(CustomValue::with_data(
            type_id,
            custom_data(DropGuard(drops.clone())),
        ));

        let a2 = a.clone();
        drop(a);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(a2);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        drop(b);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }

    /// Shared handles let a native read what another holder wrote
    #[test]
    fn test_instance_data_is_shared_and_lockable() {
        let handle = custom_data(vec![1i64, 2, 3]);
        let value = CustomValue::with_data(9, handle.clone());

        if let Some(data) = &value.data {
            let mut guard = data.lock();
            if let Some(items) = guard.downcast_mut::<Vec<i64>>() {
                items.push(4);
            }
        }
        let guard = handle.lock();
        assert_eq!(guard.downcast_ref::<Vec<i64>>(), Some(&vec![1, 2, 3, 4]));
    }

    /// Equality is identity over the shared payload
    #[test]
    fn test_custom_value_identity() {
        let handle = custom_data(0u8);
        let a = CustomValue::with_data(1, handle.clone());
        let b = CustomValue::with_data(1, handle);
        let c = CustomValue::with_data(1, custom_data(0u8));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, CustomValue::new(1));
        assert_eq!(CustomValue::new(2), CustomValue::new(2));
    }
}
