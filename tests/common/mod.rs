//! Instrumented fakes shared by the integration tests.
//!
//! `FakeDriver` opens `FakeTarget`s that never touch the network. Liveness
//! is scripted per DSN, and every call made on a target, its statements and
//! its transactions is recorded so tests can tell which side served it.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqldb::log::Logger;
use sqldb::{
    Connector, Driver, Drivers, ExecResult, Row, Target, TargetStatement, TargetTx, TxOptions,
    Value,
};
use tokio::time::Instant;
use tracing::Level;

/// Scripted liveness of one DSN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Up,
    Down,
    /// Fail this many probes, then succeed.
    FailTimes(usize),
    /// Never answer.
    Hang,
}

#[derive(Default)]
struct DriverState {
    health: Mutex<HashMap<String, Health>>,
    rejected: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<(String, Instant)>>,
    targets: Mutex<Vec<Arc<FakeTarget>>>,
}

#[derive(Clone, Default)]
pub struct FakeDriver {
    state: Arc<DriverState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_health(&self, dsn: &str, health: Health) {
        self.state.health.lock().unwrap().insert(dsn.to_string(), health);
    }

    /// Make `open` reject `dsn` outright.
    pub fn reject(&self, dsn: &str) {
        self.state.rejected.lock().unwrap().insert(dsn.to_string());
    }

    /// Every probe so far, as (dsn, time).
    pub fn attempts(&self) -> Vec<(String, Instant)> {
        self.state.attempts.lock().unwrap().clone()
    }

    pub fn attempts_for(&self, dsn: &str) -> usize {
        self.attempts().iter().filter(|(d, _)| d == dsn).count()
    }

    /// Every handle opened so far, in order.
    pub fn targets(&self) -> Vec<Arc<FakeTarget>> {
        self.state.targets.lock().unwrap().clone()
    }

    /// Registry with this driver under each of `names`.
    pub fn registry(&self, names: &[&str]) -> Drivers {
        let mut drivers = Drivers::new();
        for name in names {
            drivers.register(*name, Arc::new(self.clone()));
        }
        drivers
    }

    /// Connector using this driver with no backoff and a recording logger.
    pub fn connector(&self, names: &[&str], logger: Arc<RecordingLogger>) -> Connector {
        Connector::new(logger)
            .with_drivers(self.registry(names))
            .backoff(Duration::ZERO)
    }
}

impl Driver for FakeDriver {
    fn open(&self, driver_name: &str, dsn: &str) -> Result<Arc<dyn Target>, sqlx::Error> {
        if self.state.rejected.lock().unwrap().contains(dsn) {
            return Err(sqlx::Error::Configuration(format!("cannot parse {}", dsn).into()));
        }
        let target = Arc::new(FakeTarget {
            driver: driver_name.to_string(),
            dsn: dsn.to_string(),
            state: Arc::clone(&self.state),
            calls: Arc::new(Mutex::new(Vec::new())),
            tuning: Mutex::new(Tuning::default()),
            closes: AtomicUsize::new(0),
        });
        self.state.targets.lock().unwrap().push(Arc::clone(&target));
        Ok(target)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tuning {
    pub max_open: Option<u32>,
    pub max_idle: Option<u32>,
    pub max_lifetime: Option<Duration>,
}

/// One recorded call: operation plus SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: &'static str,
    pub sql: String,
}

type CallLog = Arc<Mutex<Vec<Call>>>;

fn record(log: &CallLog, op: &'static str, sql: &str) {
    log.lock().unwrap().push(Call {
        op,
        sql: sql.to_string(),
    });
}

/// Rows served by every fake read: the DSN that answered plus the args.
fn answer(dsn: &str, args: &[Value]) -> Row {
    let mut pairs = vec![
        ("id".to_string(), Value::Int(1)),
        ("source".to_string(), Value::from(dsn)),
    ];
    pairs.extend(
        args.iter()
            .enumerate()
            .map(|(i, v)| (format!("arg{}", i + 1), v.clone())),
    );
    Row::from_pairs(pairs)
}

fn refused() -> sqlx::Error {
    io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused").into()
}

pub struct FakeTarget {
    driver: String,
    pub dsn: String,
    state: Arc<DriverState>,
    calls: CallLog,
    tuning: Mutex<Tuning>,
    closes: AtomicUsize,
}

impl FakeTarget {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.calls().iter().map(|c| c.op).collect()
    }

    pub fn tuning(&self) -> Tuning {
        *self.tuning.lock().unwrap()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }
}

#[async_trait]
impl Target for FakeTarget {
    fn driver_name(&self) -> &str {
        &self.driver
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        self.state
            .attempts
            .lock()
            .unwrap()
            .push((self.dsn.clone(), Instant::now()));

        let health = {
            let mut all = self.state.health.lock().unwrap();
            let health = all.entry(self.dsn.clone()).or_insert(Health::Up);
            let current = *health;
            if let Health::FailTimes(n) = current {
                *health = if n <= 1 { Health::Up } else { Health::FailTimes(n - 1) };
            }
            current
        };

        match health {
            Health::Up | Health::FailTimes(0) => Ok(()),
            Health::Down | Health::FailTimes(_) => Err(refused()),
            Health::Hang => std::future::pending().await,
        }
    }

    async fn execute(&self, query: &str, _args: &[Value]) -> Result<ExecResult, sqlx::Error> {
        record(&self.calls, "execute", query);
        Ok(ExecResult::new(1, Some(42)))
    }

    async fn fetch_all(&self, query: &str, args: &[Value]) -> Result<Vec<Row>, sqlx::Error> {
        record(&self.calls, "fetch_all", query);
        Ok(vec![answer(&self.dsn, args)])
    }

    async fn fetch_optional(
        &self,
        query: &str,
        args: &[Value],
    ) -> Result<Option<Row>, sqlx::Error> {
        record(&self.calls, "fetch_optional", query);
        if query.contains("nothing") {
            return Ok(None);
        }
        Ok(Some(answer(&self.dsn, args)))
    }

    async fn begin(&self, options: TxOptions) -> Result<Box<dyn TargetTx>, sqlx::Error> {
        record(&self.calls, "begin", &format!("{:?}", options));
        Ok(Box::new(FakeTx {
            dsn: self.dsn.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }

    async fn prepare(&self, query: &str) -> Result<Box<dyn TargetStatement>, sqlx::Error> {
        record(&self.calls, "prepare", query);
        if query.contains("SYNTAX ERROR") {
            return Err(sqlx::Error::Protocol(format!("syntax error in {}", query)));
        }
        Ok(Box::new(FakeStatement {
            dsn: self.dsn.clone(),
            sql: query.to_string(),
            calls: Arc::clone(&self.calls),
            closed: AtomicBool::new(false),
        }))
    }

    fn set_max_open_conns(&self, n: u32) {
        self.tuning.lock().unwrap().max_open = Some(n);
    }

    fn set_max_idle_conns(&self, n: u32) {
        self.tuning.lock().unwrap().max_idle = Some(n);
    }

    fn set_conn_max_lifetime(&self, lifetime: Duration) {
        self.tuning.lock().unwrap().max_lifetime = Some(lifetime);
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeStatement {
    dsn: String,
    sql: String,
    calls: CallLog,
    closed: AtomicBool,
}

impl FakeStatement {
    fn check(&self) -> Result<(), sqlx::Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(sqlx::Error::Protocol("statement is closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TargetStatement for FakeStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    async fn execute(&self, _args: &[Value]) -> Result<ExecResult, sqlx::Error> {
        self.check()?;
        record(&self.calls, "stmt.execute", &self.sql);
        Ok(ExecResult::new(1, None))
    }

    async fn fetch_all(&self, args: &[Value]) -> Result<Vec<Row>, sqlx::Error> {
        self.check()?;
        record(&self.calls, "stmt.fetch_all", &self.sql);
        Ok(vec![answer(&self.dsn, args)])
    }

    async fn fetch_optional(&self, args: &[Value]) -> Result<Option<Row>, sqlx::Error> {
        self.check()?;
        record(&self.calls, "stmt.fetch_optional", &self.sql);
        Ok(Some(answer(&self.dsn, args)))
    }

    async fn close(&self) -> Result<(), sqlx::Error> {
        self.closed.store(true, Ordering::SeqCst);
        record(&self.calls, "stmt.close", &self.sql);
        Ok(())
    }
}

struct FakeTx {
    dsn: String,
    calls: CallLog,
}

#[async_trait]
impl TargetTx for FakeTx {
    async fn execute(&mut self, query: &str, _args: &[Value]) -> Result<ExecResult, sqlx::Error> {
        record(&self.calls, "tx.execute", query);
        Ok(ExecResult::new(1, None))
    }

    async fn fetch_all(&mut self, query: &str, args: &[Value]) -> Result<Vec<Row>, sqlx::Error> {
        record(&self.calls, "tx.fetch_all", query);
        Ok(vec![answer(&self.dsn, args)])
    }

    async fn fetch_optional(
        &mut self,
        query: &str,
        args: &[Value],
    ) -> Result<Option<Row>, sqlx::Error> {
        record(&self.calls, "tx.fetch_optional", query);
        Ok(Some(answer(&self.dsn, args)))
    }

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        record(&self.calls, "tx.commit", "");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error> {
        record(&self.calls, "tx.rollback", "");
        Ok(())
    }
}

/// Logger that keeps every line.
#[derive(Default)]
pub struct RecordingLogger {
    lines: Mutex<Vec<(Level, String)>>,
}

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().unwrap().clone()
    }

    pub fn at(&self, level: Level) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.at(Level::WARN)
    }

    pub fn errors(&self) -> Vec<String> {
        self.at(Level::ERROR)
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: Level, message: &str) {
        self.lines.lock().unwrap().push((level, message.to_string()));
    }
}
