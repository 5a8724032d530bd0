use std::{pin::Pin, sync::Arc};

use futures::{Stream, StreamExt};
use time::OffsetDateTime;

/// A payload plus its arrival metadata, carried end to end through the
/// pipeline.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: OffsetDateTime,
}

/// One variant per failure class: broker/store unreachable, undecodable
/// payload, rejected record, failed write. Decode and Validate errors are
/// recovered per message; a Transport error at startup is fatal.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("transport unavailable: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("validation error: {0}")]
    Validate(String),
    #[error("persist error: {0}")]
    Persist(String),
}

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

/// Source → transforms → sink. Transforms chain over the stream item by
/// item; a transform error replaces the item with an `Err`, which the sink
/// counts and skips, so one bad message never stops the loop.
pub struct Pipeline<S, T, K> {
    pub source: S,
    pub transforms: Vec<Arc<dyn Transform<T, T> + Send + Sync>>,
    pub sink: K,
}

impl<T, S, K> Pipeline<S, T, K>
where
    T: Send + 'static,
    S: Source<T> + Send + Sync + 'static,
    K: Sink<T> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<(), PipelineError> {
        let mut stream = self.source.stream().await;

        for transform in self.transforms {
            let transform = transform.clone();
            stream = Box::pin(stream.then(move |item| {
                let transform = transform.clone();
                async move {
                    match item {
                        Ok(env) => transform.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        self.sink.run(stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use time::macros::datetime;

    struct VecSource {
        items: Mutex<Option<Vec<Result<Envelope<i64>, PipelineError>>>>,
    }

    #[async_trait::async_trait]
    impl Source<i64> for VecSource {
        async fn stream(
            &self,
        ) -> Pin<Box<dyn Stream<Item = Result<Envelope<i64>, PipelineError>> + Send>> {
            let items = self.items.lock().unwrap().take().unwrap_or_default();
            Box::pin(futures::stream::iter(items))
        }
    }

    struct RejectNegative;

    #[async_trait::async_trait]
    impl Transform<i64, i64> for RejectNegative {
        async fn apply(&self, input: Envelope<i64>) -> Result<Envelope<i64>, PipelineError> {
            if input.payload < 0 {
                Err(PipelineError::Validate("negative".to_string()))
            } else {
                Ok(input)
            }
        }
    }

    #[derive(Default, Clone)]
    struct CollectSink {
        seen: Arc<Mutex<Vec<i64>>>,
        skipped: Arc<Mutex<usize>>,
    }

    #[async_trait::async_trait]
    impl Sink<i64> for CollectSink {
        async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
        where
            S: Stream<Item = Result<Envelope<i64>, PipelineError>> + Send + Unpin + 'static,
        {
            while let Some(item) = input.next().await {
                match item {
                    Ok(env) => self.seen.lock().unwrap().push(env.payload),
                    Err(_) => *self.skipped.lock().unwrap() += 1,
                }
            }
            Ok(())
        }
    }

    fn env(payload: i64) -> Result<Envelope<i64>, PipelineError> {
        Ok(Envelope {
            payload,
            received_at: datetime!(2025-03-05 18:00:00 UTC),
        })
    }

    #[tokio::test]
    async fn bad_items_are_skipped_and_later_items_still_flow() {
        let sink = CollectSink::default();
        let pipeline = Pipeline {
            source: VecSource {
                items: Mutex::new(Some(vec![
                    env(1),
                    Err(PipelineError::Decode("not json".to_string())),
                    env(-5),
                    env(2),
                ])),
            },
            transforms: vec![Arc::new(RejectNegative) as Arc<dyn Transform<i64, i64> + Send + Sync>],
            sink: sink.clone(),
        };

        pipeline.run().await.unwrap();

        assert_eq!(*sink.seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(*sink.skipped.lock().unwrap(), 2);
    }
}
