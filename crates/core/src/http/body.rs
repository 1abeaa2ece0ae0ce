//! Http body.

use std::collections::VecDeque;
use std::fmt::{self, Debug, Formatter};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use http::header::HeaderMap;
use http_body_util::combinators::BoxBody;
pub use hyper::body::{Body, Frame, Incoming, SizeHint};
use tokio::sync::mpsc;

use crate::BoxedError;
use crate::http::StatusError;

/// A `Frame<Bytes>`, the unit a [`ReqBody`]/[`ResBody`] stream yields.
pub type BytesFrame = Frame<Bytes>;

/// Body for request.
#[non_exhaustive]
pub enum ReqBody {
    /// None body.
    None,
    /// Once bytes body.
    Once(Bytes),
    /// Hyper's incoming body, received straight off the wire.
    Hyper(Incoming),
}

impl Debug for ReqBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ReqBody::None => f.write_str("ReqBody::None"),
            ReqBody::Once(_) => f.write_str("ReqBody::Once"),
            ReqBody::Hyper(_) => f.write_str("ReqBody::Hyper"),
        }
    }
}

impl Default for ReqBody {
    fn default() -> Self {
        ReqBody::None
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = BoxedError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            ReqBody::None => Poll::Ready(None),
            ReqBody::Once(bytes) => {
                if bytes.is_empty() {
                    Poll::Ready(None)
                } else {
                    let bytes = std::mem::take(bytes);
                    Poll::Ready(Some(Ok(Frame::data(bytes))))
                }
            }
            ReqBody::Hyper(inner) => Pin::new(inner).poll_frame(cx).map(|opt| opt.map(|res| res.map_err(Into::into))),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            ReqBody::None => true,
            ReqBody::Once(bytes) => bytes.is_empty(),
            ReqBody::Hyper(inner) => inner.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            ReqBody::None => SizeHint::with_exact(0),
            ReqBody::Once(bytes) => SizeHint::with_exact(bytes.len() as u64),
            ReqBody::Hyper(inner) => inner.size_hint(),
        }
    }
}

impl From<Bytes> for ReqBody {
    fn from(value: Bytes) -> ReqBody {
        ReqBody::Once(value)
    }
}
impl From<Incoming> for ReqBody {
    fn from(value: Incoming) -> ReqBody {
        ReqBody::Hyper(value)
    }
}
impl From<String> for ReqBody {
    #[inline]
    fn from(value: String) -> ReqBody {
        ReqBody::Once(value.into())
    }
}

impl From<&'static [u8]> for ReqBody {
    fn from(value: &'static [u8]) -> ReqBody {
        ReqBody::Once(value.into())
    }
}

impl From<&'static str> for ReqBody {
    fn from(value: &'static str) -> ReqBody {
        ReqBody::Once(value.into())
    }
}

impl From<Vec<u8>> for ReqBody {
    fn from(value: Vec<u8>) -> ReqBody {
        ReqBody::Once(value.into())
    }
}

impl From<Box<[u8]>> for ReqBody {
    fn from(value: Box<[u8]>) -> ReqBody {
        ReqBody::Once(value.into())
    }
}

/// Sender half of a [`ResBody::Channel`], used to stream a response body from
/// somewhere other than the handler that created it.
pub struct BodySender {
    tx: mpsc::Sender<Result<BytesFrame, BoxedError>>,
}

impl BodySender {
    /// Send one chunk of data.
    pub async fn send_data(&mut self, chunk: impl Into<Bytes>) -> Result<(), BoxedError> {
        self.tx
            .send(Ok(Frame::data(chunk.into())))
            .await
            .map_err(|e| Box::new(e) as BoxedError)
    }

    /// Send a raw frame (data or trailers).
    pub async fn send_frame(&mut self, frame: BytesFrame) -> Result<(), BoxedError> {
        self.tx.send(Ok(frame)).await.map_err(|e| Box::new(e) as BoxedError)
    }
}

/// Response body type.
#[non_exhaustive]
pub enum ResBody {
    /// None body.
    None,
    /// Once bytes body.
    Once(Bytes),
    /// Chunks body.
    Chunks(VecDeque<Bytes>),
    /// Hyper's incoming body, forwarded verbatim (used by the reverse proxy).
    Hyper(Incoming),
    /// A type-erased body, for handlers that already built a `http_body::Body`.
    Boxed(BoxBody<Bytes, BoxedError>),
    /// Stream body.
    Stream(Pin<Box<dyn Stream<Item = Result<BytesFrame, BoxedError>> + Send>>),
    /// Body fed from a [`BodySender`] on another task.
    Channel {
        /// Receiving half, polled as the body is written out.
        rx: mpsc::Receiver<Result<BytesFrame, BoxedError>>,
    },
    /// A response that failed to render; carries the status to write back.
    Error(StatusError),
}

impl ResBody {
    /// Check is that body is not set.
    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(*self, ResBody::None)
    }
    /// Check is that body is once.
    #[inline]
    pub fn is_once(&self) -> bool {
        matches!(*self, ResBody::Once(_))
    }
    /// Check is that body is chunks.
    #[inline]
    pub fn is_chunks(&self) -> bool {
        matches!(*self, ResBody::Chunks(_))
    }
    /// Check is that body is stream.
    #[inline]
    pub fn is_stream(&self) -> bool {
        matches!(*self, ResBody::Stream(_))
    }
    /// Get body's size, when it can be known without consuming the body.
    #[inline]
    pub fn size(&self) -> Option<u64> {
        match self {
            ResBody::None => Some(0),
            ResBody::Once(bytes) => Some(bytes.len() as u64),
            ResBody::Chunks(chunks) => Some(chunks.iter().map(|bytes| bytes.len() as u64).sum()),
            ResBody::Hyper(inner) => inner.size_hint().exact(),
            ResBody::Boxed(boxed) => boxed.size_hint().exact(),
            ResBody::Stream(_) | ResBody::Channel { .. } | ResBody::Error(_) => None,
        }
    }

    /// Build a streamed body from any `Stream` of frame-convertible items.
    pub fn stream<S, O, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<BytesFrame> + 'static,
        E: Into<BoxedError> + 'static,
    {
        use futures_util::StreamExt;
        let stream = stream.map(|item| item.map(Into::into).map_err(Into::into));
        ResBody::Stream(Box::pin(stream))
    }

    /// Build a channel-backed body and return the sender used to feed it.
    pub fn channel() -> (BodySender, Self) {
        let (tx, rx) = mpsc::channel(16);
        (BodySender { tx }, ResBody::Channel { rx })
    }
}

impl Default for ResBody {
    fn default() -> Self {
        ResBody::None
    }
}

impl Debug for ResBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ResBody::None => f.write_str("ResBody::None"),
            ResBody::Once(_) => f.write_str("ResBody::Once"),
            ResBody::Chunks(_) => f.write_str("ResBody::Chunks"),
            ResBody::Hyper(_) => f.write_str("ResBody::Hyper"),
            ResBody::Boxed(_) => f.write_str("ResBody::Boxed"),
            ResBody::Stream(_) => f.write_str("ResBody::Stream"),
            ResBody::Channel { .. } => f.write_str("ResBody::Channel"),
            ResBody::Error(e) => write!(f, "ResBody::Error({e:?})"),
        }
    }
}

impl Stream for ResBody {
    type Item = Result<BytesFrame, BoxedError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut() {
            ResBody::None => Poll::Ready(None),
            ResBody::Once(bytes) => {
                if bytes.is_empty() {
                    Poll::Ready(None)
                } else {
                    let bytes = std::mem::take(bytes);
                    Poll::Ready(Some(Ok(Frame::data(bytes))))
                }
            }
            ResBody::Chunks(chunks) => Poll::Ready(chunks.pop_front().map(|bytes| Ok(Frame::data(bytes)))),
            ResBody::Hyper(inner) => Pin::new(inner).poll_frame(cx).map(|opt| opt.map(|res| res.map_err(Into::into))),
            ResBody::Boxed(inner) => Pin::new(inner).poll_frame(cx),
            ResBody::Stream(stream) => stream.as_mut().poll_next(cx),
            ResBody::Channel { rx } => rx.poll_recv(cx),
            ResBody::Error(_) => Poll::Ready(None),
        }
    }
}

impl Body for ResBody {
    type Data = Bytes;
    type Error = BoxedError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.poll_next(cx)
    }

    fn is_end_stream(&self) -> bool {
        match self {
            ResBody::None => true,
            ResBody::Once(bytes) => bytes.is_empty(),
            ResBody::Chunks(chunks) => chunks.is_empty(),
            ResBody::Hyper(inner) => inner.is_end_stream(),
            ResBody::Boxed(inner) => inner.is_end_stream(),
            ResBody::Stream(_) | ResBody::Channel { .. } => false,
            ResBody::Error(_) => true,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            ResBody::None => SizeHint::with_exact(0),
            ResBody::Once(bytes) => SizeHint::with_exact(bytes.len() as u64),
            ResBody::Chunks(chunks) => {
                let size = chunks.iter().map(|bytes| bytes.len() as u64).sum();
                SizeHint::with_exact(size)
            }
            ResBody::Hyper(inner) => inner.size_hint(),
            ResBody::Boxed(inner) => inner.size_hint(),
            ResBody::Stream(_) | ResBody::Channel { .. } | ResBody::Error(_) => SizeHint::default(),
        }
    }
}

impl From<()> for ResBody {
    fn from(_: ()) -> Self {
        ResBody::None
    }
}
impl From<Bytes> for ResBody {
    fn from(value: Bytes) -> Self {
        ResBody::Once(value)
    }
}
impl From<String> for ResBody {
    fn from(value: String) -> Self {
        ResBody::Once(value.into())
    }
}
impl From<Vec<u8>> for ResBody {
    fn from(value: Vec<u8>) -> Self {
        ResBody::Once(value.into())
    }
}
impl From<Incoming> for ResBody {
    fn from(value: Incoming) -> Self {
        ResBody::Hyper(value)
    }
}
impl From<ReqBody> for ResBody {
    fn from(value: ReqBody) -> Self {
        match value {
            ReqBody::None => ResBody::None,
            ReqBody::Once(bytes) => ResBody::Once(bytes),
            ReqBody::Hyper(incoming) => ResBody::Hyper(incoming),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;

    use bytes::BytesMut;
    use futures_util::stream::{StreamExt, iter};

    use super::*;

    #[test]
    fn test_body_empty() {
        let body = ResBody::Once(Bytes::from("hello"));
        assert!(!body.is_none());
        let body = ResBody::None;
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn test_body_stream1() {
        let mut body = ResBody::Once(Bytes::from("hello"));

        let mut result = BytesMut::new();
        while let Some(Ok(frame)) = body.next().await {
            result.extend_from_slice(&frame.into_data().unwrap_or_default());
        }

        assert_eq!("hello", &result);
    }

    #[tokio::test]
    async fn test_body_stream2() {
        let mut body = ResBody::stream(iter(vec![
            Result::<_, Box<dyn StdError + Send + Sync>>::Ok(BytesMut::from("Hello").freeze()),
            Result::<_, Box<dyn StdError + Send + Sync>>::Ok(BytesMut::from(" World").freeze()),
        ]));

        let mut result = BytesMut::new();
        while let Some(Ok(frame)) = body.next().await {
            result.extend_from_slice(&frame.into_data().unwrap_or_default());
        }

        assert_eq!("Hello World", &result);
    }
}
