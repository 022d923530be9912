//! Process-wide ownership of the motion engine.
//!
//! Only one engine may be live per process. A [`EngineLease`] is the proof
//! of ownership; dropping it lets the next engine be created.

use parking_lot::{const_mutex, Condvar, Mutex};

use crate::{Error, Result};

static ENGINE_ACTIVE: Mutex<bool> = const_mutex(false);
static ENGINE_RELEASED: Condvar = Condvar::new();

/// Exclusive right to run a motion engine in this process.
#[derive(Debug)]
pub struct EngineLease {
    _private: (),
}

impl EngineLease {
    /// Take the lease, failing if another engine is live.
    pub fn try_acquire() -> Result<Self> {
        let mut active = ENGINE_ACTIVE.lock();
        if *active {
            return Err(Error::EngineAlreadyActive);
        }
        *active = true;
        Ok(Self { _private: () })
    }

    /// Take the lease, waiting until the current engine is released.
    pub fn acquire() -> Self {
        let mut active = ENGINE_ACTIVE.lock();
        while *active {
            log::debug!("Waiting for the active motion engine to be released");
            ENGINE_RELEASED.wait(&mut active);
        }
        *active = true;
        Self { _private: () }
    }

    /// Whether some engine currently holds the lease.
    pub fn is_held() -> bool {
        *ENGINE_ACTIVE.lock()
    }
}

impl Drop for EngineLease {
    fn drop(&mut self) {
        let mut active = ENGINE_ACTIVE.lock();
        *active = false;
        ENGINE_RELEASED.notify_one();
    }
}
