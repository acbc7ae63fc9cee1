use std::io::Write;

use color_eyre::Result;
use fsvault_core::{ErrorKind, Vault};
use tracing::debug;

use crate::cli::Command;

const HEALTH_DIR: &str = "/.health";
const HEALTH_PROBE: &str = "/.health/probe";

/// Execute a datastore subcommand, writing user-facing output to `out`.
/// Any error becomes a non-zero exit status in `main`.
pub fn handle<V: Vault, W: Write>(cmd: Command, vault: &V, out: &mut W) -> Result<()> {
    match cmd {
        Command::Put { key, data } => {
            vault.put(&key, data.as_bytes())?;
        }
        Command::Get { key } => {
            let data = vault.get(&key)?;
            out.write_all(&data)?;
            writeln!(out)?;
        }
        Command::Delete { key } => {
            vault.delete(&key)?;
            writeln!(out, "deleted key {key}")?;
        }
        Command::List { key } => {
            for found in vault.list(&key) {
                writeln!(out, "{found}")?;
            }
        }
        // Reading is what rotates a record onto the primary key.
        Command::Refresh { key } => {
            vault.get(&key)?;
            debug!(key, "refreshed");
        }
        Command::Health => {
            run_health(vault)?;
            writeln!(out, "Storage: ok")?;
        }
        Command::Keygen | Command::Config(_) => {
            color_eyre::eyre::bail!("not a datastore command");
        }
    }
    Ok(())
}

/// Round-trip a probe value through the vault and clean up after it.
fn run_health<V: Vault>(vault: &V) -> Result<()> {
    let payload = b"ok";
    vault.put(HEALTH_PROBE, payload)?;
    let round_trip = vault.get(HEALTH_PROBE)?;
    vault.delete(HEALTH_PROBE)?;
    // Anything a user stored under the health directory stays put.
    match vault.delete(HEALTH_DIR) {
        Err(err) if err.kind() == ErrorKind::NotEmpty => debug!("health directory kept"),
        other => other?,
    }

    if round_trip != payload {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use fsvault_core::VaultError;
    use fsvault_storage::{EncryptionKeys, FileVault, VaultConfig};
    use tempfile::TempDir;

    use super::*;

    fn test_vault(keys: &[&str]) -> (TempDir, FileVault) {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = FileVault::new(VaultConfig::new(
            dir.path().to_string_lossy(),
            EncryptionKeys::new(keys.iter().copied()),
        ));
        (dir, vault)
    }

    fn run(cmd: Command, vault: &FileVault) -> Result<String> {
        let mut out = Vec::new();
        handle(cmd, vault, &mut out)?;
        Ok(String::from_utf8(out).expect("utf8 output"))
    }

    #[test]
    fn put_then_get_prints_value() {
        let (_dir, vault) = test_vault(&["sixteen-byte-key"]);
        run(
            Command::Put {
                key: "/user/23/passphrase".into(),
                data: "Pssst".into(),
            },
            &vault,
        )
        .expect("put");

        let printed = run(
            Command::Get {
                key: "/user/23/passphrase".into(),
            },
            &vault,
        )
        .expect("get");
        assert_eq!(printed, "Pssst\n");
    }

    #[test]
    fn list_prints_one_key_per_line() {
        let (_dir, vault) = test_vault(&[]);
        for key in ["key2", "key1", "sub/key3"] {
            vault.put(key, b"x").expect("put");
        }

        let printed = run(Command::List { key: "/".into() }, &vault).expect("list");
        assert_eq!(printed, "/key1\n/key2\n/sub/\n");
    }

    #[test]
    fn delete_reports_missing_key_as_error() {
        let (_dir, vault) = test_vault(&[]);
        let err = run(Command::Delete { key: "/nope".into() }, &vault).expect_err("missing");
        let vault_err = err.downcast_ref::<VaultError>().expect("vault error");
        assert_eq!(vault_err.kind(), ErrorKind::NotFound);

        vault.put("/yes", b"x").expect("put");
        let printed = run(Command::Delete { key: "/yes".into() }, &vault).expect("delete");
        assert_eq!(printed, "deleted key /yes\n");
    }

    #[test]
    fn refresh_rotates_to_primary_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_string_lossy().into_owned();
        let old = FileVault::new(VaultConfig::new(
            root.clone(),
            EncryptionKeys::new(["sixteen-byte-key"]),
        ));
        old.put("/k", b"v").expect("put");

        let rotated = FileVault::new(VaultConfig::new(
            root.clone(),
            EncryptionKeys::new(["eheheheheheheheheheheheheheheheh", "sixteen-byte-key"]),
        ));
        let printed = run(Command::Refresh { key: "/k".into() }, &rotated).expect("refresh");
        assert!(printed.is_empty());

        let primary_only = FileVault::new(VaultConfig::new(
            root,
            EncryptionKeys::new(["eheheheheheheheheheheheheheheheh"]),
        ));
        assert_eq!(primary_only.get("/k").expect("rewritten"), b"v");
    }

    #[test]
    fn health_check_round_trips_and_cleans_up() {
        let (_dir, vault) = test_vault(&["sixteen-byte-key"]);
        let printed = run(Command::Health, &vault).expect("health");
        assert_eq!(printed, "Storage: ok\n");
        assert!(vault.list("/").is_empty());
    }

    #[test]
    fn health_check_leaves_user_keys_alone() {
        let (_dir, vault) = test_vault(&[]);
        vault.put("/.health/notes", b"mine").expect("put");

        let printed = run(Command::Health, &vault).expect("health");
        assert_eq!(printed, "Storage: ok\n");
        assert_eq!(vault.list("/.health"), ["/.health/notes"]);
        assert_eq!(vault.get("/.health/notes").expect("kept"), b"mine");
    }
}
