//! Unit-of-work: one transaction, one event buffer, one commit.
//!
//! Handlers own a `UnitOfWork` end-to-end. Every `append` both writes the
//! event row inside the transaction and buffers the wire frame; `commit`
//! flushes the buffer to the broker in append order only after the
//! transaction lands. A dropped (or explicitly rolled back) unit-of-work
//! publishes nothing: no event is ever broadcast that is not durably
//! persisted.

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use crate::broker::Broker;
use crate::log::append_event;
use crate::types::{EventContext, EventFrame, EventRecord};

pub struct UnitOfWork {
    tx: Transaction<'static, Postgres>,
    ctx: EventContext,
    buffer: Vec<EventFrame>,
}

impl UnitOfWork {
    pub async fn begin(pool: &PgPool, ctx: EventContext) -> Result<Self> {
        let tx = pool.begin().await.context("begin transaction failed")?;
        Ok(Self {
            tx,
            ctx,
            buffer: Vec::new(),
        })
    }

    /// The transaction connection, for store calls that must commit together
    /// with the buffered events.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    pub fn ctx(&self) -> &EventContext {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut EventContext {
        &mut self.ctx
    }

    /// Append one event on the context's stream and buffer its frame.
    pub async fn append(&mut self, event_type: &str, data: Value) -> Result<EventRecord> {
        let record = append_event(&mut self.tx, &mut self.ctx, event_type, data).await?;
        self.buffer.push(EventFrame::from(&record));
        Ok(record)
    }

    /// Number of events buffered so far (test hook).
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Commit the transaction, then publish the buffered frames in append
    /// order. Publish happens strictly after commit: a subscriber can never
    /// observe an event whose transaction did not land.
    pub async fn commit(self, broker: &Broker) -> Result<()> {
        self.tx.commit().await.context("commit failed")?;
        for frame in &self.buffer {
            broker.publish(frame);
        }
        Ok(())
    }

    /// Explicit abort: rolls back and discards the buffer. Dropping the
    /// unit-of-work without committing has the same effect.
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.context("rollback failed")?;
        Ok(())
    }
}
