//! Sequential account connects with out-of-band input.
//!
//! Accounts connect one after another. When the service asks for a
//! verification code or a two-factor password, the sequence suspends on a
//! resolver registered under the account id until the UI answers through a
//! [`ConnectHandle`]. The first failed account ends the sequence, and so does
//! a teardown, which also interrupts remote calls in flight.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chatsweep_remote::{AccountConnector, ConnectOutcome};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::model::{BulkConnectState, ConnectReport, ConnectRequest, InputKind};
use crate::AccountId;
use crate::config::ConnectConfig;
use crate::retry::with_timeout;

/// An attempt suspended on user input. `None` abandons it.
#[derive(Debug)]
struct Resolver {
    kind: InputKind,
    tx: oneshot::Sender<Option<String>>,
}

type Resolvers = Arc<Mutex<HashMap<AccountId, Resolver>>>;

/// Cancellation of the running sequence; replaced at the start of each run.
type Teardown = Arc<Mutex<CancellationToken>>;

/// Cloneable handle for answering and observing a bulk connect.
#[derive(Debug, Clone)]
pub struct ConnectHandle {
    resolvers: Resolvers,
    teardown: Teardown,
    state: watch::Receiver<BulkConnectState>,
}

impl ConnectHandle {
    /// Submits a verification code; returns false if none was requested.
    #[must_use = "false means the code was not delivered"]
    pub fn submit_code(&self, account_id: &AccountId, code: impl Into<String>) -> bool {
        self.resolve(account_id, |kind| *kind == InputKind::Code, Some(code.into()))
    }

    /// Submits a two-factor password; returns false if none was requested.
    #[must_use = "false means the password was not delivered"]
    pub fn submit_password(&self, account_id: &AccountId, password: impl Into<String>) -> bool {
        self.resolve(
            account_id,
            |kind| matches!(kind, InputKind::Password { .. }),
            Some(password.into()),
        )
    }

    /// Abandons the prompt of one account, failing its attempt.
    pub fn abandon(&self, account_id: &AccountId) -> bool {
        self.resolve(account_id, |_| true, None)
    }

    /// Tears the running sequence down: fails every outstanding prompt,
    /// interrupts the remote call in flight and halts the sequence.
    pub fn abandon_all(&self) {
        tear_down(&self.teardown, &self.resolvers);
    }

    /// Input the account is waiting for, if any.
    #[must_use]
    pub fn awaiting_input(&self, account_id: &AccountId) -> Option<InputKind> {
        lock(&self.resolvers)
            .get(account_id)
            .map(|resolver| resolver.kind.clone())
    }

    /// Current progress.
    #[must_use]
    pub fn state(&self) -> BulkConnectState {
        self.state.borrow().clone()
    }

    /// Progress updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BulkConnectState> {
        self.state.clone()
    }

    fn resolve(
        &self,
        account_id: &AccountId,
        accepts: impl FnOnce(&InputKind) -> bool,
        input: Option<String>,
    ) -> bool {
        let resolver = {
            let mut resolvers = lock(&self.resolvers);
            match resolvers.get(account_id).map(|r| accepts(&r.kind)) {
                Some(true) => resolvers.remove(account_id),
                Some(false) => {
                    debug!(account = %account_id, "Input of the wrong kind");
                    None
                }
                None => None,
            }
        };
        resolver.is_some_and(|resolver| resolver.tx.send(input).is_ok())
    }
}

/// Drives account connects strictly one at a time.
#[derive(Debug)]
pub struct BulkConnectSequencer<C: AccountConnector> {
    connector: C,
    config: ConnectConfig,
    resolvers: Resolvers,
    teardown: Teardown,
    state: watch::Sender<BulkConnectState>,
}

impl<C: AccountConnector> BulkConnectSequencer<C> {
    /// Creates an idle sequencer.
    #[must_use]
    pub fn new(connector: C, config: ConnectConfig) -> Self {
        let (state, _) = watch::channel(BulkConnectState::default());
        Self {
            connector,
            config,
            resolvers: Arc::default(),
            teardown: Arc::default(),
            state,
        }
    }

    /// Returns a handle for answering prompts and watching progress.
    #[must_use]
    pub fn handle(&self) -> ConnectHandle {
        ConnectHandle {
            resolvers: Arc::clone(&self.resolvers),
            teardown: Arc::clone(&self.teardown),
            state: self.state.subscribe(),
        }
    }

    /// Current progress.
    #[must_use]
    pub fn state(&self) -> BulkConnectState {
        self.state.borrow().clone()
    }

    /// Connects the accounts in order, stopping at the first failure or at
    /// a teardown.
    pub async fn connect_all(&mut self, requests: &[ConnectRequest]) -> ConnectReport {
        let cancel = CancellationToken::new();
        *lock(&self.teardown) = cancel.clone();

        let mut report = ConnectReport::default();
        self.state.send_replace(BulkConnectState {
            active: true,
            total: requests.len(),
            ..BulkConnectState::default()
        });
        info!(total = requests.len(), "Starting bulk connect");

        for (index, request) in requests.iter().enumerate() {
            if cancel.is_cancelled() {
                report.not_attempted = requests[index..].iter().map(|r| r.label.clone()).collect();
                warn!(skipped = report.not_attempted.len(), "Bulk connect torn down");
                break;
            }
            self.state.send_modify(|state| {
                state.current_account_id = Some(request.account_id.clone());
                state.awaiting = None;
            });

            let connected = self.connect_one(&request.account_id, &cancel).await;
            self.state.send_modify(|state| state.completed += 1);

            if connected {
                report.succeeded += 1;
            } else {
                report.failed_labels.push(request.label.clone());
                report.not_attempted = requests[index + 1..]
                    .iter()
                    .map(|r| r.label.clone())
                    .collect();
                warn!(
                    account = %request.account_id,
                    skipped = report.not_attempted.len(),
                    "Bulk connect halted"
                );
                break;
            }
        }

        self.state.send_modify(|state| {
            state.active = false;
            state.current_account_id = None;
            state.awaiting = None;
        });
        info!(
            succeeded = report.succeeded,
            failed = report.failed_labels.len(),
            "Bulk connect finished"
        );
        report
    }

    /// Tears the running sequence down, failing every outstanding prompt.
    pub fn shutdown(&self) {
        tear_down(&self.teardown, &self.resolvers);
    }

    async fn connect_one(&self, account_id: &AccountId, cancel: &CancellationToken) -> bool {
        let timeout = self.config.request_timeout;
        let connect = with_timeout(timeout, self.connector.connect(account_id));
        let Some(mut outcome) = until_cancelled(cancel, account_id, connect).await else {
            return false;
        };
        let mut prompts = 0;

        loop {
            let kind = match outcome {
                Ok(ConnectOutcome::Connected) => {
                    info!(account = %account_id, "Account connected");
                    return true;
                }
                Ok(ConnectOutcome::Failed { reason }) => {
                    warn!(account = %account_id, %reason, "Connect failed");
                    return false;
                }
                Err(e) => {
                    warn!(account = %account_id, "Connect request failed: {e}");
                    return false;
                }
                Ok(ConnectOutcome::CodeRequired) => InputKind::Code,
                Ok(ConnectOutcome::PasswordRequired { hint }) => InputKind::Password { hint },
            };

            prompts += 1;
            if prompts > self.config.max_input_prompts {
                warn!(account = %account_id, prompts, "Too many input prompts");
                return false;
            }

            let Some(input) = self.await_input(account_id, kind.clone(), cancel).await else {
                return false;
            };
            let submitted = match kind {
                InputKind::Code => {
                    until_cancelled(
                        cancel,
                        account_id,
                        with_timeout(timeout, self.connector.submit_code(account_id, &input)),
                    )
                    .await
                }
                InputKind::Password { .. } => {
                    until_cancelled(
                        cancel,
                        account_id,
                        with_timeout(timeout, self.connector.submit_password(account_id, &input)),
                    )
                    .await
                }
            };
            let Some(next) = submitted else {
                return false;
            };
            outcome = next;
        }
    }

    /// Suspends until the handle answers, the prompt times out or is abandoned.
    async fn await_input(
        &self,
        account_id: &AccountId,
        kind: InputKind,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let (tx, rx) = oneshot::channel();
        lock(&self.resolvers).insert(
            account_id.clone(),
            Resolver {
                kind: kind.clone(),
                tx,
            },
        );
        self.state
            .send_modify(|state| state.awaiting = Some(kind.clone()));
        info!(account = %account_id, awaiting = ?kind, "Waiting for user input");

        let wait = async {
            match self.config.input_timeout {
                Some(limit) => match tokio::time::timeout(limit, rx).await {
                    Ok(received) => received.ok().flatten(),
                    Err(_) => {
                        warn!(account = %account_id, "Timed out waiting for user input");
                        None
                    }
                },
                None => rx.await.ok().flatten(),
            }
        };
        let input = until_cancelled(cancel, account_id, wait).await.flatten();

        lock(&self.resolvers).remove(account_id);
        self.state.send_modify(|state| state.awaiting = None);
        if input.is_none() {
            info!(account = %account_id, "Input abandoned");
        }
        input
    }
}

impl<C: AccountConnector> Drop for BulkConnectSequencer<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs `fut` unless the sequence is torn down first.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    account_id: &AccountId,
    fut: impl Future<Output = T>,
) -> Option<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            info!(account = %account_id, "Connect interrupted by teardown");
            None
        }
        output = fut => Some(output),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn tear_down(teardown: &Teardown, resolvers: &Resolvers) {
    lock(teardown).cancel();
    let pending: Vec<(AccountId, Resolver)> = lock(resolvers).drain().collect();
    for (account_id, resolver) in pending {
        debug!(account = %account_id, "Force-failing pending prompt");
        let _ = resolver.tx.send(None);
    }
}
