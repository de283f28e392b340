//! MariaDB/MySQL gateway
//!
//! A blocking `NodeGateway` over sqlx. The core is synchronous, so every
//! call is driven to completion on a runtime owned by the gateway. Each
//! session is one server connection; session-scoped state such as the
//! global read lock lives exactly as long as the session.
//!
//! Status and admin statements go over the text protocol. Only the two
//! parameterised reads are prepared.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Connection, Executor, Row};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use super::{AdminCommand, Credentials, GatewayError, GatewayResult, NodeGateway, NodeSession};
use crate::topology::{NodeAddress, ReplicationState};

const REPLICA_STATUS: &str = "SHOW SLAVE STATUS";
const GLOBAL_VARIABLES: &str =
    "SELECT VARIABLE_NAME, VARIABLE_VALUE FROM information_schema.GLOBAL_VARIABLES";
const BINLOG_CONSUMERS: &str =
    "SELECT HOST FROM information_schema.PROCESSLIST WHERE COMMAND = 'Binlog Dump'";
const LONG_RUNNING_WRITES: &str = "SELECT COUNT(*) FROM information_schema.PROCESSLIST \
     WHERE COMMAND = 'Query' AND TIME >= ? AND INFO NOT LIKE 'select%'";
const GTID_WAIT: &str = "SELECT MASTER_GTID_WAIT(?, ?)";

/// Gateway to live MariaDB servers
pub struct MySqlGateway {
    runtime: Arc<Runtime>,
    connect_timeout: Duration,
}

impl MySqlGateway {
    /// Create a gateway with its own runtime.
    pub fn new(connect_timeout: Duration) -> GatewayResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GatewayError::connection("runtime", e.to_string()))?;
        Ok(Self {
            runtime: Arc::new(runtime),
            connect_timeout,
        })
    }
}

impl NodeGateway for MySqlGateway {
    fn connect(
        &self,
        credentials: &Credentials,
        address: &NodeAddress,
    ) -> GatewayResult<Box<dyn NodeSession>> {
        let options = MySqlConnectOptions::new()
            .host(&address.host)
            .port(address.port)
            .username(&credentials.user)
            .password(credentials.password.expose());

        let connect = tokio::time::timeout(self.connect_timeout, MySqlConnection::connect_with(&options));
        let conn = match self.runtime.block_on(connect) {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(GatewayError::connection(address, e.to_string())),
            Err(_) => {
                return Err(GatewayError::connection(
                    address,
                    format!("timed out after {} sec", self.connect_timeout.as_secs()),
                ))
            }
        };
        debug!(node = %address, "connected");
        Ok(Box::new(MySqlSession {
            address: address.clone(),
            runtime: Arc::clone(&self.runtime),
            conn,
        }))
    }
}

struct MySqlSession {
    address: NodeAddress,
    runtime: Arc<Runtime>,
    conn: MySqlConnection,
}

impl MySqlSession {
    fn query_err(&self, e: sqlx::Error) -> GatewayError {
        GatewayError::query(&self.address, e.to_string())
    }
}

/// Text column as a string, `None` for NULL or a missing column.
fn text(row: &MySqlRow, column: &str) -> Option<String> {
    row.try_get_unchecked::<Option<String>, _>(column)
        .ok()
        .flatten()
}

fn replication_state(row: &MySqlRow) -> ReplicationState {
    let string = |column| text(row, column).unwrap_or_default();
    ReplicationState {
        io_running: string("Slave_IO_Running").eq_ignore_ascii_case("yes"),
        sql_running: string("Slave_SQL_Running").eq_ignore_ascii_case("yes"),
        seconds_behind: text(row, "Seconds_Behind_Master").and_then(|v| v.trim().parse().ok()),
        gtid_io_pos: string("Gtid_IO_Pos"),
        source_host: string("Master_Host"),
        source_port: text(row, "Master_Port").and_then(|v| v.trim().parse().ok()),
        using_gtid: string("Using_Gtid"),
        last_io_error: string("Last_IO_Error"),
        last_sql_error: string("Last_SQL_Error"),
    }
}

impl NodeSession for MySqlSession {
    fn address(&self) -> &NodeAddress {
        &self.address
    }

    fn ping(&mut self) -> bool {
        let runtime = Arc::clone(&self.runtime);
        runtime.block_on(self.conn.ping()).is_ok()
    }

    fn read_replication_state(&mut self) -> GatewayResult<Option<ReplicationState>> {
        let runtime = Arc::clone(&self.runtime);
        let row = runtime
            .block_on(self.conn.fetch_optional(REPLICA_STATUS))
            .map_err(|e| self.query_err(e))?;
        Ok(row.as_ref().map(replication_state))
    }

    fn read_all_variables(&mut self) -> GatewayResult<BTreeMap<String, String>> {
        let runtime = Arc::clone(&self.runtime);
        let rows = runtime
            .block_on(self.conn.fetch_all(GLOBAL_VARIABLES))
            .map_err(|e| self.query_err(e))?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = text(row, "VARIABLE_NAME")?;
                Some((name.to_ascii_uppercase(), text(row, "VARIABLE_VALUE").unwrap_or_default()))
            })
            .collect())
    }

    fn list_replication_consumers(&mut self) -> GatewayResult<Vec<String>> {
        let runtime = Arc::clone(&self.runtime);
        let rows = runtime
            .block_on(self.conn.fetch_all(BINLOG_CONSUMERS))
            .map_err(|e| self.query_err(e))?;
        Ok(rows.iter().filter_map(|row| text(row, "HOST")).collect())
    }

    fn count_long_running_writes(&mut self, age: Duration) -> GatewayResult<u64> {
        let runtime = Arc::clone(&self.runtime);
        let count: i64 = runtime
            .block_on(
                sqlx::query_scalar(LONG_RUNNING_WRITES)
                    .bind(age.as_secs() as i64)
                    .fetch_one(&mut self.conn),
            )
            .map_err(|e| self.query_err(e))?;
        Ok(count.max(0) as u64)
    }

    fn wait_for_gtid(&mut self, position: &str, timeout: Duration) -> GatewayResult<bool> {
        let runtime = Arc::clone(&self.runtime);
        let result: Option<i64> = runtime
            .block_on(
                sqlx::query_scalar(GTID_WAIT)
                    .bind(position)
                    .bind(timeout.as_secs_f64())
                    .fetch_one(&mut self.conn),
            )
            .map_err(|e| self.query_err(e))?;
        // 0 = reached, -1 = timed out, NULL = bad arguments
        match result {
            Some(0) => Ok(true),
            Some(_) => Ok(false),
            None => Err(GatewayError::query(
                &self.address,
                format!("invalid GTID position '{}'", position),
            )),
        }
    }

    fn exec_admin(&mut self, command: &AdminCommand) -> GatewayResult<()> {
        let statement = command.to_statement();
        let runtime = Arc::clone(&self.runtime);
        runtime
            .block_on(self.conn.execute(statement.as_str()))
            .map_err(|e| GatewayError::exec(&self.address, command.name(), e.to_string()))?;
        info!(node = %self.address, command = %command, "admin command executed");
        Ok(())
    }
}

impl Drop for MySqlSession {
    fn drop(&mut self) {
        debug!(node = %self.address, "session closed");
    }
}
