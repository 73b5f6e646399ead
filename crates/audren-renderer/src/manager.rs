//! Fixed pool of renderer session ids.

use parking_lot::Mutex;

use crate::error::{RendererError, Result};
use crate::params::MAX_SESSIONS;

#[derive(Debug)]
struct SessionPool {
    free: Vec<usize>,
    in_use: [bool; MAX_SESSIONS],
}

/// Hands out session ids from a free list. Never blocks.
#[derive(Debug)]
pub struct Manager {
    pool: Mutex<SessionPool>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    /// A pool of [`MAX_SESSIONS`] free sessions.
    pub fn new() -> Self {
        Self {
            pool: Mutex::new(SessionPool {
                free: (0..MAX_SESSIONS).rev().collect(),
                in_use: [false; MAX_SESSIONS],
            }),
        }
    }

    /// Takes a free session id, or fails with
    /// [`RendererError::OutOfSessions`].
    pub fn acquire_session(&self) -> Result<usize> {
        let mut pool = self.pool.lock();
        let id = pool.free.pop().ok_or_else(|| {
            tracing::warn!("session pool exhausted");
            RendererError::OutOfSessions
        })?;
        pool.in_use[id] = true;
        tracing::debug!(session = id, "session acquired");
        Ok(id)
    }

    /// Returns `id` to the pool. Releasing a free or unknown id fails with
    /// [`RendererError::NotFound`].
    pub fn release_session(&self, id: usize) -> Result<()> {
        let mut guard = self.pool.lock();
        let pool = &mut *guard;
        match pool.in_use.get_mut(id) {
            Some(used) if *used => {
                *used = false;
                pool.free.push(id);
                tracing::debug!(session = id, "session released");
                Ok(())
            }
            _ => Err(RendererError::NotFound),
        }
    }

    /// Sessions currently held.
    pub fn active_count(&self) -> usize {
        MAX_SESSIONS - self.pool.lock().free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_until_exhausted() {
        let m = Manager::new();
        let ids: HashSet<usize> = (0..MAX_SESSIONS).map(|_| m.acquire_session().unwrap()).collect();
        assert_eq!(ids.len(), MAX_SESSIONS);
        assert_eq!(m.acquire_session(), Err(RendererError::OutOfSessions));
        assert_eq!(m.active_count(), MAX_SESSIONS);
    }

    #[test]
    fn released_id_is_reused() {
        let m = Manager::new();
        let a = m.acquire_session().unwrap();
        m.release_session(a).unwrap();
        assert_eq!(m.active_count(), 0);
        assert_eq!(m.acquire_session().unwrap(), a);
    }

    #[test]
    fn double_release_is_not_found() {
        let m = Manager::new();
        let a = m.acquire_session().unwrap();
        m.release_session(a).unwrap();
        assert_eq!(m.release_session(a), Err(RendererError::NotFound));
        assert_eq!(m.release_session(MAX_SESSIONS), Err(RendererError::NotFound));
    }

    #[test]
    fn first_id_is_zero() {
        assert_eq!(Manager::new().acquire_session().unwrap(), 0);
    }
}
