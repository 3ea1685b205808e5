// Copyright 2020 Joyent, Inc.

use std::io::{Error as IOError, ErrorKind};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use slog::{info, o, Drain, Logger};

use failover_pool::config::ManagerConfig;
use failover_pool::connection::Connection;
use failover_pool::factory::ConnectionFactory;
use failover_pool::manager::{Manager, PooledConnection};
use failover_pool::pool_manager::ConnectionPoolManager;
use failover_pool::server::Backend;

#[derive(Debug)]
pub struct DummyConnection {
    id: u64,
    backend: Backend,
    connected: bool,
}

impl Connection for DummyConnection {
    type Error = IOError;
    type Server = Backend;

    fn server(&self) -> &Backend {
        &self.backend
    }

    fn test(&mut self) -> bool {
        self.connected
    }

    fn disconnect(&mut self) -> Result<(), IOError> {
        self.connected = false;
        Ok(())
    }
}

/// Pretends that every server on `down_port` refuses connections.
pub struct DummyFactory {
    down_port: u16,
    next_id: AtomicU64,
}

impl ConnectionFactory for DummyFactory {
    type Server = Backend;
    type Connection = DummyConnection;
    type Error = IOError;

    fn create_server(&self, entry: &str) -> Result<Backend, IOError> {
        entry
            .parse::<SocketAddr>()
            .map(Backend::from)
            .map_err(|e| IOError::new(ErrorKind::InvalidInput, e))
    }

    fn create_connection(
        &self,
        server: &Backend,
        _so_timeout: Duration,
        _con_timeout: Duration,
    ) -> Result<DummyConnection, IOError> {
        if server.port == self.down_port {
            return Err(IOError::new(
                ErrorKind::ConnectionRefused,
                "connection refused",
            ));
        }

        Ok(DummyConnection {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            backend: server.clone(),
            connected: true,
        })
    }
}

fn main() {
    let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    let log = Logger::root(
        Mutex::new(slog_term::FullFormat::new(plain).build()).fuse(),
        o!("build-id" => "0.1.0"),
    );

    info!(log, "running basic failover-pool example");

    let localhost = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
    let servers: Vec<String> = vec![55555, 55556, 55557]
        .into_iter()
        .map(|port| SocketAddr::from((localhost, port)).to_string())
        .collect();

    let config = ManagerConfig::new(servers)
        .tries(3)
        .sleep_time(100)
        .con_timeout(1000);

    let factory = DummyFactory {
        down_port: 55555,
        next_id: AtomicU64::new(0),
    };

    let pool = ConnectionPoolManager::new(&config, factory, Some(log.clone()));
    let pool = match pool {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            info!(log, "failed to build pool: {}", e);
            return;
        }
    };

    // Three threads hold a connection at the same time, so each gets its own.
    let barrier = Arc::new(Barrier::new(3));
    let threads: Vec<_> = (0..3)
        .map(|i| {
            let pool = pool.clone();
            let barrier = barrier.clone();
            let log = log.clone();
            thread::spawn(move || {
                let conn = PooledConnection::claim(&*pool)
                    .expect("connection unavailable");
                info!(
                    log,
                    "thread {} claimed connection {} to {}",
                    i,
                    conn.id,
                    conn.server()
                );
                barrier.wait();
            })
        })
        .collect();

    for thread in threads {
        let _ = thread.join();
    }

    // Every connection was handed back, so this one comes from the pool.
    if let Ok(conn) = PooledConnection::claim(&*pool) {
        info!(log, "reused connection {} to {}", conn.id, conn.server());
    }

    let stats = pool.stats();
    info!(
        log,
        "created {} reused {} idle {}",
        stats.created_connections,
        stats.reused_connections,
        stats.idle_connections
    );

    pool.shutdown();
}
