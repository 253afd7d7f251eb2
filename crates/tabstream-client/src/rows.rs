//! Row sources for bulk loads.
//!
//! The bulk engine consumes a finite lazy sequence of rows through one
//! abstraction, [`RowSource`]: pull one row, possibly suspending.
//! Adapters cover the concrete shapes callers have — in-memory
//! collections, fallible iterators, and async streams.

use std::future::Future;

use futures_core::Stream;
use futures_util::StreamExt;
use tabstream_types::SqlValue;

use crate::error::Error;

/// One row of a bulk load.
#[derive(Debug, Clone)]
pub enum BulkRow {
    /// Values aligned positionally with the configured columns.
    Tuple(Vec<SqlValue>),
    /// Values keyed by column name; missing columns read as NULL.
    Named(Vec<(String, SqlValue)>),
}

/// Conversion into a [`BulkRow`].
pub trait IntoBulkRow {
    /// Convert into a row.
    fn into_bulk_row(self) -> BulkRow;
}

impl IntoBulkRow for BulkRow {
    fn into_bulk_row(self) -> BulkRow {
        self
    }
}

impl IntoBulkRow for Vec<SqlValue> {
    fn into_bulk_row(self) -> BulkRow {
        BulkRow::Tuple(self)
    }
}

impl<const N: usize> IntoBulkRow for [SqlValue; N] {
    fn into_bulk_row(self) -> BulkRow {
        BulkRow::Tuple(self.into())
    }
}

impl IntoBulkRow for Vec<(String, SqlValue)> {
    fn into_bulk_row(self) -> BulkRow {
        BulkRow::Named(self)
    }
}

impl IntoBulkRow for Vec<(&str, SqlValue)> {
    fn into_bulk_row(self) -> BulkRow {
        BulkRow::Named(
            self.into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

/// A finite lazy sequence of rows.
///
/// `try_next` is the single suspension point the bulk engine drives;
/// the source is only polled when the transport has room, so producers
/// inherit the engine's backpressure. A producer error aborts the bulk
/// load with that exact error value.
pub trait RowSource {
    /// Pull the next row, suspending as needed. `Ok(None)` ends the
    /// sequence.
    fn try_next(&mut self) -> impl Future<Output = Result<Option<BulkRow>, Error>> + Send;
}

/// Row source over an infallible iterator. See [`rows`].
#[derive(Debug)]
pub struct IterSource<I> {
    iter: I,
}

/// Wrap a collection or synchronous iterator as a row source.
pub fn rows<I>(source: I) -> IterSource<I::IntoIter>
where
    I: IntoIterator,
    I::Item: IntoBulkRow,
{
    IterSource {
        iter: source.into_iter(),
    }
}

impl<I> RowSource for IterSource<I>
where
    I: Iterator + Send,
    I::Item: IntoBulkRow + Send,
{
    async fn try_next(&mut self) -> Result<Option<BulkRow>, Error> {
        Ok(self.iter.next().map(IntoBulkRow::into_bulk_row))
    }
}

/// Row source over a fallible iterator. See [`try_rows`].
#[derive(Debug)]
pub struct TryIterSource<I> {
    iter: I,
}

/// Wrap a fallible synchronous iterator as a row source.
///
/// The first `Err` item aborts the bulk load with that error.
pub fn try_rows<I, R>(source: I) -> TryIterSource<I::IntoIter>
where
    I: IntoIterator<Item = Result<R, Error>>,
    R: IntoBulkRow,
{
    TryIterSource {
        iter: source.into_iter(),
    }
}

impl<I, R> RowSource for TryIterSource<I>
where
    I: Iterator<Item = Result<R, Error>> + Send,
    R: IntoBulkRow + Send,
{
    async fn try_next(&mut self) -> Result<Option<BulkRow>, Error> {
        match self.iter.next() {
            Some(Ok(row)) => Ok(Some(row.into_bulk_row())),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// Row source over an async stream. See [`row_stream`].
#[derive(Debug)]
pub struct StreamSource<S> {
    inner: S,
}

/// Wrap an async stream of fallible rows as a row source.
pub fn row_stream<S, R>(stream: S) -> StreamSource<S>
where
    S: Stream<Item = Result<R, Error>> + Unpin + Send,
    R: IntoBulkRow,
{
    StreamSource { inner: stream }
}

impl<S, R> RowSource for StreamSource<S>
where
    S: Stream<Item = Result<R, Error>> + Unpin + Send,
    R: IntoBulkRow + Send,
{
    async fn try_next(&mut self) -> Result<Option<BulkRow>, Error> {
        match self.inner.next().await {
            Some(Ok(row)) => Ok(Some(row.into_bulk_row())),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rows_from_vec() {
        let mut source = rows(vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(2)]]);

        assert!(matches!(
            source.try_next().await.unwrap(),
            Some(BulkRow::Tuple(v)) if v == vec![SqlValue::Int(1)]
        ));
        assert!(source.try_next().await.unwrap().is_some());
        assert!(source.try_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_named_rows() {
        let mut source = rows(vec![vec![("id", SqlValue::Int(1))]]);

        match source.try_next().await.unwrap().unwrap() {
            BulkRow::Named(pairs) => {
                assert_eq!(pairs[0].0, "id");
                assert_eq!(pairs[0].1, SqlValue::Int(1));
            }
            BulkRow::Tuple(_) => panic!("expected named row"),
        }
    }

    #[tokio::test]
    async fn test_try_rows_propagates_error() {
        let items: Vec<Result<Vec<SqlValue>, Error>> = vec![
            Ok(vec![SqlValue::Int(1)]),
            Err(Error::BulkInput("source failed".into())),
        ];
        let mut source = try_rows(items);

        assert!(source.try_next().await.unwrap().is_some());
        let err = source.try_next().await.unwrap_err();
        assert_eq!(err.to_string(), "source failed");
    }

    #[tokio::test]
    async fn test_row_stream() {
        let stream = futures_util::stream::iter(
            vec![Ok::<_, Error>(vec![SqlValue::Int(5)])],
        );
        let mut source = row_stream(stream);

        assert!(source.try_next().await.unwrap().is_some());
        assert!(source.try_next().await.unwrap().is_none());
    }
}
