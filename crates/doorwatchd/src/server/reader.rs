//! One pending read per armed link.
//!
//! A read owns its link while it is in flight and hands it back with the
//! outcome, so the server loop can re-arm it or drop it. Each read also
//! watches the link's [`LinkHandle`]: once the registry closes the handle,
//! the read resolves as [`ReadOutcome::Evicted`] even if data is pending.

use std::io;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::registry::LinkHandle;
use crate::transport::Link;

/// What happened on a link.
#[derive(Debug)]
pub enum ReadOutcome {
    /// One complete chunk.
    Frame(Vec<u8>),
    /// A chunk larger than the frame limit; holds the bytes actually read.
    Oversized(usize),
    /// Peer closed the link.
    Closed,
    /// The registry closed the handle (removal, reconnect, or sweep).
    Evicted,
    Failed(io::Error),
}

/// A finished read, returning ownership of the link.
pub struct LinkRead<L> {
    pub link: L,
    pub handle: LinkHandle,
    pub outcome: ReadOutcome,
}

/// Starts one read of at most `max_frame_size` bytes.
pub fn arm<L: Link>(
    link: L,
    handle: LinkHandle,
    max_frame_size: usize,
) -> BoxFuture<'static, LinkRead<L>> {
    read_once(link, handle, max_frame_size).boxed()
}

async fn read_once<L: Link>(link: L, handle: LinkHandle, max_frame_size: usize) -> LinkRead<L> {
    // One spare byte tells an exactly-full frame apart from a truncated one.
    let mut buf = vec![0u8; max_frame_size.saturating_add(1)];

    let received = tokio::select! {
        biased;
        _ = handle.closed() => None,
        result = link.recv(&mut buf) => Some(result),
    };

    let outcome = match received {
        None => ReadOutcome::Evicted,
        Some(Ok(0)) => ReadOutcome::Closed,
        Some(Ok(n)) if n > max_frame_size => ReadOutcome::Oversized(n),
        Some(Ok(n)) => {
            buf.truncate(n);
            ReadOutcome::Frame(buf)
        }
        Some(Err(e)) => ReadOutcome::Failed(e),
    };

    LinkRead {
        link,
        handle,
        outcome,
    }
}
