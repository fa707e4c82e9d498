//! Session Lock (C2): single-writer admission over the device, with a
//! forceful preemption mode, realized with `parking_lot::Mutex<LockState>`
//! standing in for the spin lock a real driver takes at dispatch IRQL
//! (the teacher's choice for this exact role, `uncflow-agent/common/msr.rs`).

use crate::error::{DeviceError, Result};
use crate::wire::{LockFlag, StatusFlag};
use parking_lot::Mutex;

/// Identifies the caller's open session. Stands in for "the caller's
/// device-handle object pointer" the real driver compares against.
pub type HandleId = u64;

#[derive(Debug, Clone, Copy, Default)]
struct LockState {
    owner: Option<HandleId>,
}

pub struct SessionLock {
    state: Mutex<LockState>,
}

impl SessionLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
        }
    }

    pub fn status(&self) -> StatusFlag {
        match self.state.lock().owner {
            None => StatusFlag::Idle,
            Some(_) => StatusFlag::Busy,
        }
    }

    pub fn owner(&self) -> Option<HandleId> {
        self.state.lock().owner
    }

    /// Acquire or release the session lock per `flag`. `LOCK_GET` fails
    /// if another handle already holds it; `LOCK_GET_FORCE` preempts any
    /// current holder unconditionally; `LOCK_RELEASE` only succeeds for
    /// the current holder.
    pub fn handle(&self, flag: LockFlag, requester: HandleId) -> Result<StatusFlag> {
        let mut state = self.state.lock();
        match flag {
            LockFlag::Get => match state.owner {
                None => {
                    state.owner = Some(requester);
                    Ok(StatusFlag::LockAcquired)
                }
                Some(owner) if owner == requester => Ok(StatusFlag::LockAcquired),
                Some(_) => Ok(StatusFlag::Busy),
            },
            LockFlag::GetForce => {
                state.owner = Some(requester);
                Ok(StatusFlag::LockAcquired)
            }
            LockFlag::Release => match state.owner {
                Some(owner) if owner == requester => {
                    state.owner = None;
                    Ok(StatusFlag::Idle)
                }
                Some(_) => Err(DeviceError::InvalidDeviceState(
                    "lock release requested by non-owning handle".into(),
                )),
                None => Err(DeviceError::InvalidDeviceState(
                    "lock release requested while idle".into(),
                )),
            },
        }
    }

    /// True only if `requester` currently holds the lock. An unheld lock
    /// admits no one (`original_source/wperf-driver/utilities.c::AmILocking`
    /// never returns true while `current_status.file_object` is unset);
    /// every privileged IOCTL requires a prior `LOCK_ACQUIRE`.
    pub fn admits(&self, requester: HandleId) -> bool {
        self.state.lock().owner == Some(requester)
    }
}

impl Default for SessionLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_client_is_refused_while_locked() {
        let lock = SessionLock::new();
        assert_eq!(
            lock.handle(LockFlag::Get, 1).unwrap(),
            StatusFlag::LockAcquired
        );
        assert_eq!(lock.handle(LockFlag::Get, 2).unwrap(), StatusFlag::Busy);
    }

    #[test]
    fn force_preempts_current_holder() {
        let lock = SessionLock::new();
        lock.handle(LockFlag::Get, 1).unwrap();
        assert_eq!(
            lock.handle(LockFlag::GetForce, 2).unwrap(),
            StatusFlag::LockAcquired
        );
        assert_eq!(lock.owner(), Some(2));
    }

    #[test]
    fn release_by_non_owner_is_rejected() {
        let lock = SessionLock::new();
        lock.handle(LockFlag::Get, 1).unwrap();
        assert!(lock.handle(LockFlag::Release, 2).is_err());
        assert_eq!(lock.owner(), Some(1));
    }

    #[test]
    fn release_by_owner_returns_to_idle() {
        let lock = SessionLock::new();
        lock.handle(LockFlag::Get, 1).unwrap();
        assert_eq!(lock.handle(LockFlag::Release, 1).unwrap(), StatusFlag::Idle);
        assert_eq!(lock.status(), StatusFlag::Idle);
    }

    #[test]
    fn unlocked_device_admits_no_caller() {
        let lock = SessionLock::new();
        assert!(!lock.admits(1));
        assert!(!lock.admits(2));
    }

    #[test]
    fn admits_only_the_current_holder() {
        let lock = SessionLock::new();
        lock.handle(LockFlag::Get, 1).unwrap();
        assert!(lock.admits(1));
        assert!(!lock.admits(2));
    }
}
