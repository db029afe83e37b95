//! Reusable VM instances.
//!
//! Constructing a VM is cheap but not free; high-throughput hosts that
//! execute many short programs can recycle instances through a [`VmPool`].
//! Instances are reset on both acquire and release, so a pooled VM is
//! indistinguishable from a fresh one.

use crate::memory::Memory;
use crate::program::Program;
use crate::vm::{Config, ExecResult, ExecuteOptions, Vm};
use std::sync::Mutex;

/// A pool of reset-and-reuse [`Vm`] instances sharing one configuration.
pub struct VmPool {
    config: Config,
    idle: Mutex<Vec<Vm>>,
}

impl VmPool {
    /// Creates a pool; all instances use this configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Creates a pool with the default configuration.
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Acquires a VM, freshly reset. Pair with [`put`](Self::put).
    pub fn get(&self) -> Vm {
        let recycled = self.lock_idle().pop();
        match recycled {
            Some(mut vm) => {
                vm.reset();
                vm
            }
            None => Vm::with_config(self.config.clone()),
        }
    }

    /// Returns a VM to the pool for reuse.
    pub fn put(&self, mut vm: Vm) {
        vm.reset();
        self.lock_idle().push(vm);
    }

    /// Acquires a VM, executes the program, and releases the VM.
    /// Safe for concurrent use with separate memories.
    pub fn execute(
        &self,
        program: &Program,
        memory: &mut dyn Memory,
        opts: &ExecuteOptions,
    ) -> ExecResult {
        let mut vm = self.get();
        let result = vm.execute(program, memory, opts);
        self.put(vm);
        result
    }

    /// Runs a closure with a pooled VM, releasing it afterwards.
    pub fn with_vm<R>(&self, f: impl FnOnce(&mut Vm) -> R) -> R {
        let mut vm = self.get();
        let result = f(&mut vm);
        self.put(vm);
        result
    }

    /// Number of idle instances currently held.
    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, Vec<Vm>> {
        match self.idle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
