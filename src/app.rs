use colored::Colorize;
use inquire::{Password, PasswordDisplayMode};
use zeroize::Zeroizing;

use crate::command::Args;
use crate::config::Config;
use crate::delegate::{self, Connector};
use crate::error::Error;
use crate::resolve;
use crate::store;

/// Print a success message with checkmark
fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg.green());
}

/// Print an info line (normal text, indented)
fn info(msg: &str) {
    println!("  {}", msg);
}

/// Read the store passphrase without echoing it.
pub fn prompt_passphrase() -> Result<Zeroizing<String>, Error> {
    Password::new("Secrets passphrase>")
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Hidden)
        .prompt()
        .map(Zeroizing::new)
        .map_err(|e| Error::Prompt(e.to_string()))
}

pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run<C: Connector>(&self, args: &Args, passphrase: &str, connector: C) -> Result<(), Error> {
        let ack = self.delegate(args, passphrase, connector).await?;
        success(&format!("Delegated '{}'", args.label));
        info(&ack);
        Ok(())
    }

    /// Unlock the store, resolve `args.label`, then send one delegation.
    ///
    /// The store is zeroed before any network traffic starts.
    async fn delegate<C: Connector>(&self, args: &Args, passphrase: &str, connector: C) -> Result<String, Error> {
        let path = self.config.store_path(args);
        let mode = self.config.kdf_mode(args);
        let defaults = self.config.defaults(args);

        let params = {
            let store = store::open(&path, passphrase, mode)?;
            resolve::resolve(&store, &args.label, &defaults)?
        };
        tracing::debug!(?params, "delegation parameters resolved");

        let channel = connector.connect(&params.server, &params.ca_file)?;
        delegate::dispatch(channel, &params).await
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::path::PathBuf;

    use super::*;
    use crate::delegate::{Channel, DelegateRequest, Https};
    use crate::store::{KdfMode, SecretStore};

    const PASSPHRASE: &str = "correct horse";

    #[derive(Default)]
    struct Recorder {
        connects: Cell<usize>,
        target: RefCell<Option<(String, String)>>,
        sent: RefCell<Vec<serde_json::Value>>,
    }

    struct RecordingChannel<'a>(&'a Recorder);

    impl<'a> Connector for &'a Recorder {
        type Channel = RecordingChannel<'a>;

        fn connect(&self, server: &str, ca_file: &str) -> Result<RecordingChannel<'a>, Error> {
            self.connects.set(self.connects.get() + 1);
            *self.target.borrow_mut() = Some((server.to_string(), ca_file.to_string()));
            Ok(RecordingChannel(*self))
        }
    }

    impl Channel for RecordingChannel<'_> {
        async fn delegate(self, request: &DelegateRequest) -> Result<String, Error> {
            self.0.sent.borrow_mut().push(serde_json::to_value(request).unwrap());
            Ok("ok".to_string())
        }
    }

    fn store_file(dir: &tempfile::TempDir) -> PathBuf {
        let mut store = SecretStore::default();
        store.insert(
            "prod-db",
            b"s3cr3t",
            &[("ro-user", "alice"), ("ro-server", "10.0.0.5:8080")],
        );
        store.insert("staging", b"st4g1ng", &[]);

        let path = dir.path().join("secrets.db");
        let sealed = store::seal(&store, PASSPHRASE, KdfMode::Interactive).unwrap();
        std::fs::write(&path, sealed).unwrap();
        path
    }

    fn args(path: PathBuf, label: &str) -> Args {
        Args {
            label: label.to_string(),
            store: Some(path),
            interactive: true,
            ca: Some(String::new()),
            count: Some(5),
            duration: Some("1h".to_string()),
            labels: Some("ops,db".to_string()),
            owners: Some("bob".to_string()),
            ..Args::default()
        }
    }

    #[tokio::test]
    async fn delegates_with_record_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::new(Config::default());
        let recorder = Recorder::default();

        let ack = app
            .delegate(&args(store_file(&dir), "prod-db"), PASSPHRASE, &recorder)
            .await
            .unwrap();

        assert_eq!(ack, "ok");
        assert_eq!(recorder.connects.get(), 1);
        assert_eq!(
            *recorder.target.borrow(),
            Some(("10.0.0.5:8080".to_string(), String::new()))
        );
        assert_eq!(
            recorder.sent.borrow()[0],
            serde_json::json!({
                "Name": "alice",
                "Password": "s3cr3t",
                "Uses": 5,
                "Time": "1h",
                "Users": ["bob"],
                "Labels": ["ops", "db"],
            })
        );
    }

    #[tokio::test]
    async fn cli_user_fills_missing_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::new(Config::default());
        let recorder = Recorder::default();
        let args = Args {
            user: Some("carol".to_string()),
            ..args(store_file(&dir), "staging")
        };

        app.delegate(&args, PASSPHRASE, &recorder).await.unwrap();

        let sent = recorder.sent.borrow();
        assert_eq!(sent[0]["Name"], "carol");
        assert_eq!(sent[0]["Password"], "st4g1ng");
        assert_eq!(
            *recorder.target.borrow(),
            Some(("127.0.0.1:8080".to_string(), String::new()))
        );
    }

    #[tokio::test]
    async fn unknown_label_never_connects() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::new(Config::default());
        let recorder = Recorder::default();

        let err = app
            .delegate(&args(store_file(&dir), "nope"), PASSPHRASE, &recorder)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RecordNotFound(_)));
        assert_eq!(recorder.connects.get(), 0);
        assert!(recorder.sent.borrow().is_empty());
    }

    #[tokio::test]
    async fn missing_store_never_connects() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::new(Config::default());
        let recorder = Recorder::default();

        let err = app
            .delegate(&args(dir.path().join("absent.db"), "prod-db"), PASSPHRASE, &recorder)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::StoreNotFound(_)));
        assert_eq!(recorder.connects.get(), 0);
    }

    #[tokio::test]
    async fn wrong_passphrase_never_connects() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::new(Config::default());
        let recorder = Recorder::default();

        let err = app
            .delegate(&args(store_file(&dir), "prod-db"), "wrong horse", &recorder)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::StoreOpen(_)));
        assert_eq!(recorder.connects.get(), 0);
    }

    #[tokio::test]
    async fn unreachable_server_reports_without_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::new(Config::default());
        let args = Args {
            server: Some("127.0.0.1:1".to_string()),
            ..args(store_file(&dir), "staging")
        };

        let err = app.run(&args, PASSPHRASE, Https).await.unwrap_err();

        assert!(matches!(err, Error::Connection(_)));
        let message = err.to_string();
        assert!(!message.contains("st4g1ng"));
        assert!(!message.contains(PASSPHRASE));
    }
}
