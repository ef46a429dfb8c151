//! Pass-through exports for a companion secret-provisioning channel.
//!
//! This crate's job ends at deciding whether the peer is a trustworthy
//! enclave. What happens next — usually handing the now-authenticated peer
//! some secret over the same connection — is a different protocol, owned by
//! whatever transport the embedding application already speaks. These four
//! functions exist only so that protocol's entry points are reachable from
//! the same artifact; none of them is implemented here.

use std::io;

/// A caller-supplied channel these pass-throughs forward to. Never
/// implemented in this crate: the concrete transport (TCP, a TLS session
/// resumption ticket, a named pipe) is the embedder's responsibility.
pub trait SecretTransport {
    fn start_server(&self, bind_addr: &str) -> io::Result<()>;
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&self, buf: &[u8]) -> io::Result<usize>;
    fn close(&self) -> io::Result<()>;
}

pub fn start_server(
    transport: &dyn SecretTransport,
    bind_addr: &str,
) -> io::Result<()> {
    transport.start_server(bind_addr)
}

pub fn read(transport: &dyn SecretTransport, buf: &mut [u8]) -> io::Result<usize> {
    transport.read(buf)
}

pub fn write(transport: &dyn SecretTransport, buf: &[u8]) -> io::Result<usize> {
    transport.write(buf)
}

pub fn close(transport: &dyn SecretTransport) -> io::Result<()> {
    transport.close()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeTransport {
        closed: AtomicBool,
    }

    impl SecretTransport for FakeTransport {
        fn start_server(&self, _bind_addr: &str) -> io::Result<()> {
            Ok(())
        }
        fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
            buf.fill(0);
            Ok(buf.len())
        }
        fn write(&self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }
        fn close(&self) -> io::Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_pass_through_forwards_to_transport() {
        let transport = FakeTransport {
            closed: AtomicBool::new(false),
        };
        start_server(&transport, "127.0.0.1:0").unwrap();
        let mut buf = [0xffu8; 4];
        assert_eq!(read(&transport, &mut buf).unwrap(), 4);
        assert_eq!(write(&transport, &buf).unwrap(), 4);
        close(&transport).unwrap();
        assert!(transport.closed.load(Ordering::SeqCst));
    }
}
