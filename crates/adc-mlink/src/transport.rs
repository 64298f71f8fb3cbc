//! Blocking UDP transport for MLink register requests

use adc_core::RegFrame;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::frame::{self, MLinkError, MLinkHeader, KIND_REG_REQUEST, KIND_REG_RESPONSE};

/// Default MLink UDP port on the device
pub const MLINK_PORT: u16 = 33300;

/// Default response timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Source id the host puts in request headers
pub const DEFAULT_HOST_ID: u16 = 0xfefe;

const MTU: usize = 2048;

/// Destination id of the register endpoint on the device
const DEVICE_ID: u16 = 0x0001;

struct Link {
    socket: UdpSocket,
    seq: u16,
}

/// One UDP link to one device.
///
/// The socket sits behind a mutex, so concurrent callers take turns and only
/// one request/response exchange is ever in flight.
pub struct MLinkTransport {
    link: Mutex<Link>,
    target: SocketAddr,
    timeout_ms: u64,
    host_id: u16,
}

impl MLinkTransport {
    pub fn connect(target: SocketAddr, timeout_ms: u64, host_id: u16) -> Result<Self, MLinkError> {
        let bind = if target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind)?;
        debug!(target = %target, local = ?socket.local_addr().ok(), "Opened MLink socket");

        Ok(Self {
            link: Mutex::new(Link { socket, seq: 0 }),
            target,
            timeout_ms,
            host_id,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Send a register request and wait for the matching response.
    ///
    /// Datagrams from other peers, corrupt packets and packets carrying
    /// another sequence number are dropped; nothing is retransmitted.
    pub fn transceive(&self, request: &RegFrame) -> Result<RegFrame, MLinkError> {
        let mut link = self.lock();
        let seq = link.seq;
        link.seq = link.seq.wrapping_add(1);

        let header = MLinkHeader {
            kind: KIND_REG_REQUEST,
            seq,
            src: self.host_id,
            dst: DEVICE_ID,
        };
        let packet = frame::encode(&header, request)?;

        trace!(
            target = %self.target,
            seq = seq,
            ops = request.ops.len(),
            "Sending MLink register request"
        );
        link.socket.send_to(&packet, self.target)?;

        let deadline = Instant::now() + Duration::from_millis(self.timeout_ms);
        let mut buf = vec![0u8; MTU];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(MLinkError::Timeout(self.timeout_ms));
            }
            link.socket.set_read_timeout(Some(remaining))?;

            let (len, from) = match link.socket.recv_from(&mut buf) {
                Ok(r) => r,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(MLinkError::Timeout(self.timeout_ms));
                }
                Err(e) => return Err(e.into()),
            };
            if from != self.target {
                debug!(from = %from, "Ignoring datagram from unexpected peer");
                continue;
            }

            let (resp, regs) = match frame::decode(&buf[..len]) {
                Ok(decoded) => decoded,
                Err(e) => {
                    debug!(error = %e, "Ignoring corrupt MLink packet");
                    continue;
                }
            };
            if resp.kind != KIND_REG_RESPONSE || resp.seq != seq {
                debug!(
                    kind = resp.kind,
                    seq = resp.seq,
                    expected_seq = seq,
                    "Ignoring stale MLink packet"
                );
                continue;
            }

            debug!(
                target = %self.target,
                seq = seq,
                ops = regs.ops.len(),
                "Received MLink register response"
            );
            return Ok(regs);
        }
    }
}
