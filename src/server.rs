//! TCP transport driving [`SmtpProtocol`].

use crate::config::Config;
use crate::error::Error;
use crate::protocol::SmtpProtocol;
use crate::session::Session;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// RFC 5321 limit for a text line including CRLF.
const MAX_LINE_LENGTH: u64 = 1000;
/// DATA lines may carry one extra dot from dot-stuffing.
const MAX_DATA_LINE_LENGTH: u64 = MAX_LINE_LENGTH + 1;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);
static STARTED: LazyLock<String> =
    LazyLock::new(|| chrono::Utc::now().format("%Y%m%d%H%M%S").to_string());

fn next_session_id() -> String {
    let n = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}.{n}", *STARTED)
}

/// Binds to the configured address and serves until accepting fails.
pub async fn run_smtp_server(config: Arc<Config>, protocol: Arc<SmtpProtocol>) -> Result<(), Error> {
    let addr = format!("{}:{}", config.listen_address, config.listen_port);
    let listener = TcpListener::bind(&addr).await?;
    log::info!("Listening on {addr}");
    serve(listener, config, protocol).await
}

/// Accept connections on `listener`, one task per connection.
pub async fn serve(
    listener: TcpListener,
    config: Arc<Config>,
    protocol: Arc<SmtpProtocol>,
) -> Result<(), Error> {
    loop {
        let (socket, remote_addr) = listener.accept().await?;
        let config = config.clone();
        let protocol = protocol.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, remote_addr, config, protocol).await {
                log::error!("Error handling connection from {remote_addr}: {e}");
            }
        });
    }
}

async fn handle_connection(
    socket: TcpStream,
    remote_addr: SocketAddr,
    config: Arc<Config>,
    protocol: Arc<SmtpProtocol>,
) -> Result<(), Error> {
    socket.set_nodelay(true)?;
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    let mut session = Session::new(next_session_id(), remote_addr, config.clone());
    log::debug!("Session {} opened by {remote_addr}", session.id());

    writer
        .write_all(format!("220 {} {}\r\n", config.hostname, config.greeting()).as_bytes())
        .await?;

    let mut line = Vec::new();
    loop {
        line.clear();
        let limit = match session.has_line_handler() {
            true => MAX_DATA_LINE_LENGTH,
            false => MAX_LINE_LENGTH,
        };
        let n = (&mut reader)
            .take(limit)
            .read_until(b'\n', &mut line)
            .await?;
        if n == 0 {
            break;
        }

        let response = if !line.ends_with(b"\n") {
            if !skip_line(&mut reader).await? {
                break;
            }
            protocol.on_line_too_long(&mut session)
        } else if !line.ends_with(b"\r\n") {
            // A stray LF most likely means an attempt to smuggle commands.
            log::warn!(
                "Line without CRLF ending in session {}, closing connection",
                session.id()
            );
            break;
        } else {
            protocol.on_line(&mut session, &line).await
        };

        let Some(response) = response else {
            continue;
        };
        writer.write_all(response.to_wire().as_bytes()).await?;
        if response.is_end_session() {
            break;
        }
    }

    log::debug!("Session {} closed", session.id());
    Ok(())
}

/// Discard input up to and including the next LF.
///
/// Returns `false` if the peer closed the connection first.
async fn skip_line<R>(reader: &mut R) -> Result<bool, Error>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    loop {
        let (found, len) = {
            let buf = reader.fill_buf().await?;
            if buf.is_empty() {
                return Ok(false);
            }
            match buf.iter().position(|&b| b == b'\n') {
                Some(pos) => (true, pos + 1),
                None => (false, buf.len()),
            }
        };
        reader.consume(len);
        if found {
            return Ok(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingHook, config};
    use testresult::TestResult;
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

    async fn start() -> TestResult<(SocketAddr, Arc<RecordingHook>)> {
        let recorder = Arc::new(RecordingHook::default());
        let protocol = SmtpProtocol::builder()
            .message_hook(recorder.clone())
            .build()?;
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(serve(listener, Arc::new(config()), Arc::new(protocol)));
        Ok((addr, recorder))
    }

    /// Read one complete, possibly multi-line, reply.
    async fn reply(reader: &mut BufReader<OwnedReadHalf>) -> TestResult<String> {
        let mut reply = String::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await?;
            reply.push_str(&line);
            if line.len() < 4 || line.as_bytes().get(3) != Some(&b'-') {
                return Ok(reply);
            }
        }
    }

    #[tokio::test]
    async fn test_conversation() -> TestResult {
        let (addr, recorder) = start().await?;
        let (reader, mut writer) = TcpStream::connect(addr).await?.into_split();
        let mut reader = BufReader::new(reader);

        assert!(reply(&mut reader).await?.starts_with("220 mx.example.org "));

        writer.write_all(b"EHLO client.example\r\n").await?;
        let ehlo = reply(&mut reader).await?;
        assert!(ehlo.starts_with("250-mx.example.org Hello client.example [127.0.0.1]\r\n"));
        assert!(ehlo.ends_with("250 8BITMIME\r\n"));

        // Pipelined commands are answered in order.
        writer
            .write_all(b"MAIL FROM:<a@x.com>\r\nRCPT TO:<b@y.com>\r\nDATA\r\n")
            .await?;
        assert_eq!(reply(&mut reader).await?, "250 2.1.0 Sender <a@x.com> OK\r\n");
        assert_eq!(reply(&mut reader).await?, "250 2.1.5 Recipient <b@y.com> OK\r\n");
        assert!(reply(&mut reader).await?.starts_with("354 "));

        writer.write_all(b"Subject: hi\r\n\r\nhello\r\n.\r\n").await?;
        assert_eq!(reply(&mut reader).await?, "250 2.6.0 Message received\r\n");
        assert_eq!(recorder.queued().len(), 1);

        writer.write_all(b"QUIT\r\n").await?;
        assert!(reply(&mut reader).await?.starts_with("221 "));
        assert_eq!(reply(&mut reader).await?, "", "connection must be closed");
        Ok(())
    }

    #[tokio::test]
    async fn test_bare_lf_closes_connection() -> TestResult {
        let (addr, _) = start().await?;
        let (reader, mut writer) = TcpStream::connect(addr).await?.into_split();
        let mut reader = BufReader::new(reader);
        reply(&mut reader).await?;

        writer.write_all(b"NOOP\n").await?;

        assert_eq!(reply(&mut reader).await?, "");
        Ok(())
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(next_session_id(), next_session_id());
    }

    async fn open_transaction(
        reader: &mut BufReader<OwnedReadHalf>,
        writer: &mut OwnedWriteHalf,
    ) -> TestResult {
        reply(reader).await?;
        writer
            .write_all(b"HELO client.example\r\nMAIL FROM:<a@x.com>\r\nRCPT TO:<b@y.com>\r\nDATA\r\n")
            .await?;
        for _ in 0..3 {
            reply(reader).await?;
        }
        assert!(reply(reader).await?.starts_with("354 "));
        Ok(())
    }

    #[tokio::test]
    async fn test_stuffed_line_of_maximum_length_is_accepted() -> TestResult {
        let (addr, recorder) = start().await?;
        let (reader, mut writer) = TcpStream::connect(addr).await?.into_split();
        let mut reader = BufReader::new(reader);
        open_transaction(&mut reader, &mut writer).await?;

        // 998 octets once unstuffed, 999 plus CRLF on the wire.
        let body = "a".repeat(997);
        writer
            .write_all(format!("Subject: x\r\n\r\n..{body}\r\n.\r\n").as_bytes())
            .await?;

        assert_eq!(reply(&mut reader).await?, "250 2.6.0 Message received\r\n");
        let queued = recorder.queued();
        assert_eq!(
            queued.first().map(Vec::as_slice),
            Some(format!("Subject: x\r\n\r\n.{body}\r\n").as_bytes())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_over_long_data_line_refuses_message() -> TestResult {
        let (addr, recorder) = start().await?;
        let (reader, mut writer) = TcpStream::connect(addr).await?.into_split();
        let mut reader = BufReader::new(reader);
        open_transaction(&mut reader, &mut writer).await?;

        let body = "a".repeat(1500);
        writer
            .write_all(format!("Subject: x\r\n\r\n{body}\r\nafter\r\n.\r\n").as_bytes())
            .await?;

        assert_eq!(reply(&mut reader).await?, "500 5.5.2 Line too long\r\n");
        assert!(recorder.queued().is_empty());

        writer.write_all(b"NOOP\r\n").await?;
        assert_eq!(reply(&mut reader).await?, "250 2.0.0 OK\r\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_over_long_command_keeps_connection() -> TestResult {
        let (addr, _) = start().await?;
        let (reader, mut writer) = TcpStream::connect(addr).await?.into_split();
        let mut reader = BufReader::new(reader);
        reply(&mut reader).await?;

        let argument = "x".repeat(2000);
        writer
            .write_all(format!("NOOP {argument}\r\nNOOP\r\n").as_bytes())
            .await?;

        assert_eq!(reply(&mut reader).await?, "500 5.5.2 Line too long\r\n");
        assert_eq!(reply(&mut reader).await?, "250 2.0.0 OK\r\n");
        Ok(())
    }
}
