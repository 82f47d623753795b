use futures::channel::mpsc;
use futures::{SinkExt, Stream, StreamExt};
use tracing::error;

use crate::protocol::{BodyKind, Message, ParseError, PayloadItem};

use super::ReqBody;

/// A request from the handler side for one more payload item.
#[derive(Debug)]
pub(crate) enum FetchSignal {
    More,
}

/// Creates the two halves of a streaming body: the [`ReqBody`] that travels
/// with the request, and the [`BodyPump`] the connection keeps to feed it.
///
/// `stream` is the framed reader the payload items come from; it stays with
/// the connection so the next head can be parsed from the same buffer once
/// the body is finished.
pub(crate) fn body_channel<S, T>(stream: &mut S, kind: BodyKind) -> (ReqBody, BodyPump<'_, S>)
where
    S: Stream<Item = Result<Message<T>, ParseError>> + Unpin,
{
    let (signal_tx, signal_rx) = mpsc::channel(8);
    let (data_tx, data_rx) = mpsc::channel(8);

    (ReqBody::streaming(signal_tx, data_rx, kind), BodyPump { stream, signal_rx, data_tx, eof: false })
}

/// The connection-side half of a streaming body.
///
/// While the handler runs, [`BodyPump::pump`] answers its fetch signals.
/// Afterwards [`BodyPump::drain`] discards whatever the handler left
/// unread, which restores the end-of-message invariant: no payload bytes of
/// request N remain buffered when the head of request N+1 is parsed.
#[derive(Debug)]
pub(crate) struct BodyPump<'conn, S> {
    stream: &'conn mut S,
    signal_rx: mpsc::Receiver<FetchSignal>,
    data_tx: mpsc::Sender<Result<PayloadItem, ParseError>>,
    eof: bool,
}

impl<S, T> BodyPump<'_, S>
where
    S: Stream<Item = Result<Message<T>, ParseError>> + Unpin,
{
    /// Serves fetch signals until the body reaches eof, an error occurs, or
    /// the handler drops its body without consuming it (the signal channel
    /// closes).
    pub(crate) async fn pump(&mut self) {
        if self.eof {
            return;
        }

        while let Some(FetchSignal::More) = self.signal_rx.next().await {
            match self.next_item().await {
                Ok(item) => {
                    self.eof = item.is_eof();
                    if let Err(e) = self.data_tx.send(Ok(item)).await {
                        error!("failed to forward body chunk to handler: {}", e);
                        return;
                    }
                    if self.eof {
                        return;
                    }
                }
                Err(e) => {
                    error!("failed to read body chunk: {}", e);
                    let _ = self.data_tx.send(Err(e)).await;
                    return;
                }
            }
        }
    }

    /// Reads and discards payload items until eof.
    pub(crate) async fn drain(&mut self) -> Result<(), ParseError> {
        while !self.eof {
            let item = self.next_item().await?;
            self.eof = item.is_eof();
        }
        Ok(())
    }

    async fn next_item(&mut self) -> Result<PayloadItem, ParseError> {
        match self.stream.next().await {
            Some(Ok(Message::Payload(item))) => Ok(item),
            Some(Ok(Message::Head(_))) => {
                error!("received a message head while streaming a body");
                Err(ParseError::invalid_body("received a message head while streaming a body"))
            }
            Some(Err(e)) => Err(e),
            None => Err(ParseError::UnexpectedEof),
        }
    }
}
