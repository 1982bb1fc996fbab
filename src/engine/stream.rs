// SPDX-License-Identifier: Apache-2.0

//! Lazy row sequence over a live server-side cursor.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, Stream, StreamExt};

use dbkit_core::{EngineResult, Row};

/// Rows of one query, in cursor order.
///
/// Single forward pass, not restartable. The cursor is released as soon as
/// the last row has been read, on the first error, or when the stream is
/// dropped early, whichever happens first. While the stream is alive it
/// borrows the connection, so no other statement can run on it.
pub struct RowStream<'a> {
    cursor: Option<BoxStream<'a, EngineResult<Row>>>,
    sql: &'a str,
    rows_read: u64,
}

impl<'a> RowStream<'a> {
    pub(crate) fn new(cursor: BoxStream<'a, EngineResult<Row>>, sql: &'a str) -> Self {
        Self {
            cursor: Some(cursor),
            sql,
            rows_read: 0,
        }
    }

    /// Whether the underlying cursor is still open.
    pub fn is_open(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Releases the cursor without reading the remaining rows.
    pub fn close(&mut self) {
        if self.cursor.take().is_some() {
            tracing::trace!(target: "dbkit::sql", rows = self.rows_read, "Cursor closed");
        }
    }
}

impl Stream for RowStream<'_> {
    type Item = EngineResult<Row>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(cursor) = this.cursor.as_mut() else {
            return Poll::Ready(None);
        };

        match cursor.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(row))) => {
                this.rows_read += 1;
                Poll::Ready(Some(Ok(row)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.close();
                Poll::Ready(Some(Err(err.into_sql(this.sql))))
            }
            Poll::Ready(None) => {
                this.close();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.cursor {
            Some(cursor) => cursor.size_hint(),
            None => (0, Some(0)),
        }
    }
}
