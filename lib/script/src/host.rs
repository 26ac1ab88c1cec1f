//! The scripting-host bridge contract (C10, spec.md §4 Non-goals / §6 / §9): every major object
//! in this workspace takes a host state pointer and exposes factory/method wiring, but which
//! scripting host that is stays unspecified. This crate names the seam - `ScriptHost`,
//! `LuaFactory`, `LuaMethodTable` - without embedding a VM. Grounded on the teacher's
//! `ComponentClass`/`Component` factory-registration idiom
//! (examples/SleepingPills-bushhammer/server/lib/neutronium/src/component.rs), generalized from
//! "a process-assigned small-integer id per Rust type, set up by a `ctor`-run macro" to "an
//! opaque handle per script-constructed instance, minted at runtime by whichever embedding
//! implements these traits".

use crate::error::ConfigError;
use gdf_frame::{LuaHost, LuaValue};
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque handle to a script-constructed object. Carries no meaning outside the `ScriptHost` that
/// minted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub u64);

/// Mints fresh, process-unique handles. A `LuaFactory` implementation typically owns one of
/// these rather than reusing a global counter, so handles from unrelated factories never collide
/// even if nothing else distinguishes them.
#[derive(Debug, Default)]
pub struct HandleAllocator(AtomicU64);

impl HandleAllocator {
    pub fn new() -> HandleAllocator {
        HandleAllocator(AtomicU64::new(0))
    }

    pub fn next(&self) -> Handle {
        Handle(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Constructs instances of one script-visible type from an ordered argument list. Registered
/// under a type name with whichever `ScriptHost` implementation is in play.
pub trait LuaFactory: Send + Sync {
    fn construct(&self, args: &[LuaValue]) -> Result<Handle, ConfigError>;
}

/// The method descriptor table spec.md §9 describes: `{name, fn(args) -> result}`, implemented
/// once per constructed instance.
pub trait LuaMethodTable: Send {
    fn dispatch(&mut self, name: &str, args: &[LuaValue]) -> Result<Vec<LuaValue>, ConfigError>;
}

/// The host state pointer every major object in this workspace is specified to take (spec.md
/// §9's "scripting-host coupling" note). `values()` is the narrower push/arg bridge `Field::to_lua`
/// and `Field::from_lua` (C1) use to marshal a single scalar; `construct`/`call_method` are the
/// factory and method-dispatch half of the contract. Nothing in this workspace depends on a
/// concrete `ScriptHost` - it is the seam an embedding fills in.
pub trait ScriptHost {
    fn values(&mut self) -> &mut dyn LuaHost;
    fn construct(&mut self, type_name: &str, args: &[LuaValue]) -> Result<Handle, ConfigError>;
    fn call_method(&mut self, handle: Handle, name: &str, args: &[LuaValue]) -> Result<Vec<LuaValue>, ConfigError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct PointFactory {
        handles: HandleAllocator,
    }

    struct Point {
        x: f64,
        y: f64,
    }

    impl LuaFactory for PointFactory {
        fn construct(&self, args: &[LuaValue]) -> Result<Handle, ConfigError> {
            match args {
                [LuaValue::Float(x), LuaValue::Float(y)] => {
                    let _ = Point { x: *x, y: *y };
                    Ok(self.handles.next())
                }
                _ => Err(ConfigError::new("point() takes exactly two floats")),
            }
        }
    }

    impl LuaMethodTable for Point {
        fn dispatch(&mut self, name: &str, args: &[LuaValue]) -> Result<Vec<LuaValue>, ConfigError> {
            match name {
                "sum" => Ok(vec![LuaValue::Float(self.x + self.y)]),
                "translate" => match args {
                    [LuaValue::Float(dx), LuaValue::Float(dy)] => {
                        self.x += dx;
                        self.y += dy;
                        Ok(vec![])
                    }
                    _ => Err(ConfigError::new("translate() takes exactly two floats")),
                },
                other => Err(ConfigError::new(format!("no such method '{}'", other))),
            }
        }
    }

    /// A minimal in-memory host proving the three traits compose: it owns a type-name ->
    /// `LuaFactory` map and a `Handle` -> instance map it populates itself after `construct`
    /// succeeds, since the binding between a minted handle and its method table is exactly the
    /// part a real embedding, not this contract, is responsible for.
    struct FakeHost {
        factories: HashMap<String, Box<dyn LuaFactory>>,
        instances: HashMap<Handle, Point>,
    }

    impl FakeHost {
        fn construct_point(&mut self, type_name: &str, args: &[LuaValue]) -> Result<Handle, ConfigError> {
            let factory = self
                .factories
                .get(type_name)
                .ok_or_else(|| ConfigError::new(format!("no factory for '{}'", type_name)))?;
            let handle = factory.construct(args)?;
            if let [LuaValue::Float(x), LuaValue::Float(y)] = args {
                self.instances.insert(handle, Point { x: *x, y: *y });
            }
            Ok(handle)
        }

        fn call(&mut self, handle: Handle, name: &str, args: &[LuaValue]) -> Result<Vec<LuaValue>, ConfigError> {
            self.instances
                .get_mut(&handle)
                .ok_or_else(|| ConfigError::new("unknown handle"))?
                .dispatch(name, args)
        }
    }

    #[test]
    fn construct_then_dispatch_round_trips_through_the_contract() {
        let mut host = FakeHost { factories: HashMap::new(), instances: HashMap::new() };
        host.factories.insert("point".to_string(), Box::new(PointFactory { handles: HandleAllocator::new() }));

        let handle = host.construct_point("point", &[LuaValue::Float(1.0), LuaValue::Float(2.0)]).unwrap();
        let result = host.call(handle, "sum", &[]).unwrap();
        assert_eq!(result, vec![LuaValue::Float(3.0)]);

        host.call(handle, "translate", &[LuaValue::Float(1.0), LuaValue::Float(1.0)]).unwrap();
        let result = host.call(handle, "sum", &[]).unwrap();
        assert_eq!(result, vec![LuaValue::Float(5.0)]);
    }

    #[test]
    fn unknown_type_name_is_a_config_error() {
        let mut host = FakeHost { factories: HashMap::new(), instances: HashMap::new() };
        assert!(host.construct_point("missing", &[]).is_err());
    }

    #[test]
    fn wrong_argument_shape_is_a_config_error() {
        let factory = PointFactory { handles: HandleAllocator::new() };
        assert!(factory.construct(&[LuaValue::Int(1)]).is_err());
    }
}
