//! Transaction boundary with explicit after-commit / after-rollback hooks.
//!
//! A [`UnitOfWork`] wraps one storage transaction. Work done inside it can
//! register callbacks that fire only once the outcome is known: commit hooks
//! run after the transaction has durably committed, rollback hooks run when
//! it is rolled back, fails to commit, or is dropped unfinished (an early
//! `?` return).

use std::ops::Deref;

use rusqlite::{Connection, Transaction};

use crate::errors::BoardResult;

type Hook = Box<dyn FnOnce() + Send + 'static>;

pub struct UnitOfWork<'conn> {
    // Field order matters: the transaction rolls back before `hooks` fires
    // its rollback callbacks on drop.
    tx: Transaction<'conn>,
    hooks: Hooks,
}

impl<'conn> UnitOfWork<'conn> {
    pub fn new(tx: Transaction<'conn>) -> Self {
        Self {
            tx,
            hooks: Hooks::default(),
        }
    }

    pub fn conn(&self) -> &Connection {
        &self.tx
    }

    /// Run `hook` after a successful commit. Hooks run in registration order.
    pub fn after_commit(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.after_commit.push(Box::new(hook));
    }

    /// Run `hook` if this unit of work does not commit.
    pub fn after_rollback(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.after_rollback.push(Box::new(hook));
    }

    pub fn pending_hooks(&self) -> usize {
        self.hooks.after_commit.len()
    }

    pub fn commit(self) -> BoardResult<()> {
        let UnitOfWork { tx, hooks } = self;
        match tx.commit() {
            Ok(()) => {
                hooks.settle_committed();
                Ok(())
            }
            // `hooks` drops unsettled here and runs the rollback callbacks.
            Err(e) => Err(e.into()),
        }
    }

    pub fn rollback(self) -> BoardResult<()> {
        let UnitOfWork { tx, hooks } = self;
        let result = tx.rollback();
        drop(hooks);
        result.map_err(Into::into)
    }
}

impl Deref for UnitOfWork<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.tx
    }
}

#[derive(Default)]
struct Hooks {
    after_commit: Vec<Hook>,
    after_rollback: Vec<Hook>,
    settled: bool,
}

impl Hooks {
    fn settle_committed(mut self) {
        self.settled = true;
        for hook in std::mem::take(&mut self.after_commit) {
            hook();
        }
    }
}

impl Drop for Hooks {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;
        for hook in std::mem::take(&mut self.after_rollback) {
            hook();
        }
    }
}
