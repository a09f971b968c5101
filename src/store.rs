//! # Document store
//!
//! All persisted state lives in named record collections inside a single
//! JSON document, `canteen.json`, under the data directory:
//!
//! - `items`, `items1`, `items2`: item catalogs of the IT, MBA and MAIN canteens
//! - `orders`: every order record, tagged with its canteen label
//! - `user_detail`, `admin`: login credentials
//!
//! The snapshot is held in memory behind a lock. A mutation runs under the
//! write lock against a copy, the copy is written to a temporary file and
//! renamed over the document, and only then does it replace the in-memory
//! snapshot. A multi-record change (increment the sold counter and append the
//! order, or check a username and insert it) therefore either lands entirely
//! or not at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{Canteen, Credential, Item, Order, Role};

const DOCUMENT_FILE: &str = "canteen.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk layout of the document, one field per collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    items: Vec<Item>,
    #[serde(default)]
    items1: Vec<Item>,
    #[serde(default)]
    items2: Vec<Item>,
    #[serde(default)]
    orders: Vec<Order>,
    #[serde(default)]
    user_detail: Vec<Credential>,
    #[serde(default)]
    admin: Vec<Credential>,
}

impl Snapshot {
    fn catalog(&self, canteen: Canteen) -> &Vec<Item> {
        match canteen {
            Canteen::It => &self.items,
            Canteen::Mba => &self.items1,
            Canteen::Main => &self.items2,
        }
    }

    fn catalog_mut(&mut self, canteen: Canteen) -> &mut Vec<Item> {
        match canteen {
            Canteen::It => &mut self.items,
            Canteen::Mba => &mut self.items1,
            Canteen::Main => &mut self.items2,
        }
    }

    fn credentials(&self, role: Role) -> &Vec<Credential> {
        match role {
            Role::User => &self.user_detail,
            Role::Admin => &self.admin,
        }
    }

    fn credentials_mut(&mut self, role: Role) -> &mut Vec<Credential> {
        match role {
            Role::User => &mut self.user_detail,
            Role::Admin => &mut self.admin,
        }
    }
}

pub struct Database {
    /// `None` keeps everything in memory
    dir: Option<PathBuf>,
    snapshot: RwLock<Snapshot>,
}

impl Database {
    /// Open (or create) the document store under `dir`
    ///
    /// Creates the directory if it doesn't exist and starts from empty
    /// collections when there is no document yet.
    ///
    /// # Errors
    /// * `StoreError::Io` if the directory or document cannot be accessed
    /// * `StoreError::Json` if an existing document cannot be parsed
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir)?;

        let path = dir.join(DOCUMENT_FILE);
        let snapshot = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Snapshot::default()
        };

        info!(
            path = %path.display(),
            orders = snapshot.orders.len(),
            users = snapshot.user_detail.len(),
            "Document store opened"
        );

        Ok(Self {
            dir: Some(dir),
            snapshot: RwLock::new(snapshot),
        })
    }

    /// A store that never touches the disk
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> Result<T, StoreError> {
        let guard = self.snapshot.read().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&guard))
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Snapshot) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.snapshot.write().map_err(|_| StoreError::Poisoned)?;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(snapshot)?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(&json)?;
        file.as_file().sync_all()?;
        file.persist(dir.join(DOCUMENT_FILE))
            .map_err(|e| StoreError::Io(e.error))?;

        debug!(bytes = json.len(), "Document persisted");
        Ok(())
    }

    pub fn list_items(&self, canteen: Canteen) -> Result<Vec<Item>, StoreError> {
        self.read(|s| s.catalog(canteen).clone())
    }

    pub fn get_item(&self, canteen: Canteen, id: &str) -> Result<Item, StoreError> {
        self.read(|s| s.catalog(canteen).iter().find(|i| i.id == id).cloned())?
            .ok_or(StoreError::NotFound("item"))
    }

    /// Add an item with a zero sold counter
    pub fn create_item(&self, canteen: Canteen, name: &str, cost: u32) -> Result<Item, StoreError> {
        self.mutate(|s| {
            let item = Item {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                cost,
                quantity_sold: 0,
            };
            s.catalog_mut(canteen).push(item.clone());
            Ok(item)
        })
    }

    /// Change an item's name and cost; the sold counter is left alone
    pub fn update_item(
        &self,
        canteen: Canteen,
        id: &str,
        name: &str,
        cost: u32,
    ) -> Result<Item, StoreError> {
        self.mutate(|s| {
            let item = s
                .catalog_mut(canteen)
                .iter_mut()
                .find(|i| i.id == id)
                .ok_or(StoreError::NotFound("item"))?;
            item.name = name.to_string();
            item.cost = cost;
            Ok(item.clone())
        })
    }

    /// Remove an item. Orders that copied it are not touched.
    pub fn delete_item(&self, canteen: Canteen, id: &str) -> Result<Item, StoreError> {
        self.mutate(|s| {
            let catalog = s.catalog_mut(canteen);
            let index = catalog
                .iter()
                .position(|i| i.id == id)
                .ok_or(StoreError::NotFound("item"))?;
            Ok(catalog.remove(index))
        })
    }

    /// Increment the item's sold counter and append the order as one unit
    ///
    /// The order copies the item's name and cost as they are at this moment.
    ///
    /// # Errors
    /// * `StoreError::NotFound` if the item doesn't exist; nothing is changed
    /// * `StoreError::Io` if the document cannot be written; nothing is changed
    pub fn place_order(
        &self,
        canteen: Canteen,
        item_id: &str,
        username: &str,
        token: String,
        timestamp: DateTime<Utc>,
    ) -> Result<Order, StoreError> {
        self.mutate(|s| {
            let item = s
                .catalog_mut(canteen)
                .iter_mut()
                .find(|i| i.id == item_id)
                .ok_or(StoreError::NotFound("item"))?;
            item.quantity_sold += 1;

            let order = Order {
                id: Uuid::new_v4().to_string(),
                token,
                item_name: item.name.clone(),
                cost: item.cost,
                timestamp,
                canteen,
                username: username.to_string(),
            };
            s.orders.push(order.clone());
            Ok(order)
        })
    }

    /// All orders placed by `username`, newest first
    pub fn orders_for_user(&self, username: &str) -> Result<Vec<Order>, StoreError> {
        self.read(|s| newest_first(s.orders.iter().filter(|o| o.username == username)))
    }

    /// All orders carrying the canteen's label, newest first
    pub fn orders_for_canteen(&self, canteen: Canteen) -> Result<Vec<Order>, StoreError> {
        self.read(|s| newest_first(s.orders.iter().filter(|o| o.canteen == canteen)))
    }

    pub fn delete_order(&self, id: &str) -> Result<Order, StoreError> {
        self.mutate(|s| {
            let index = s
                .orders
                .iter()
                .position(|o| o.id == id)
                .ok_or(StoreError::NotFound("order"))?;
            Ok(s.orders.remove(index))
        })
    }

    /// Look up a credential by exact username
    pub fn find_credential(
        &self,
        role: Role,
        username: &str,
    ) -> Result<Option<Credential>, StoreError> {
        self.read(|s| {
            s.credentials(role)
                .iter()
                .find(|c| c.username == username)
                .cloned()
        })
    }

    /// Insert a credential unless the username is taken
    ///
    /// The check and the insert happen under the same write lock, so two
    /// concurrent signups for one username cannot both succeed.
    pub fn insert_credential(&self, role: Role, credential: Credential) -> Result<(), StoreError> {
        self.mutate(|s| {
            let records = s.credentials_mut(role);
            if records.iter().any(|c| c.username == credential.username) {
                return Err(StoreError::Conflict("username"));
            }
            records.push(credential);
            Ok(())
        })
    }

    pub fn update_password(
        &self,
        role: Role,
        username: &str,
        password_hash: String,
    ) -> Result<(), StoreError> {
        self.mutate(|s| {
            let record = s
                .credentials_mut(role)
                .iter_mut()
                .find(|c| c.username == username)
                .ok_or(StoreError::NotFound("user"))?;
            record.password_hash = password_hash;
            Ok(())
        })
    }
}

fn newest_first<'a>(orders: impl Iterator<Item = &'a Order>) -> Vec<Order> {
    let mut orders: Vec<Order> = orders.cloned().collect();
    orders.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    orders
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn credential(username: &str) -> Credential {
        Credential {
            username: username.to_string(),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn order_increments_counter_and_copies_item() {
        let db = Database::in_memory();
        let coffee = db.create_item(Canteen::It, "Coffee", 20).unwrap();

        let order = db
            .place_order(Canteen::It, &coffee.id, "asha", "4821".into(), Utc::now())
            .unwrap();

        assert_eq!(order.item_name, "Coffee");
        assert_eq!(order.cost, 20);
        assert_eq!(order.canteen, Canteen::It);
        assert_eq!(order.username, "asha");
        assert_eq!(db.get_item(Canteen::It, &coffee.id).unwrap().quantity_sold, 1);
        assert_eq!(db.orders_for_user("asha").unwrap(), vec![order]);
    }

    #[test]
    fn unknown_item_changes_nothing() {
        let db = Database::in_memory();
        let tea = db.create_item(Canteen::Mba, "Tea", 10).unwrap();

        // Item exists, but in another canteen's collection.
        let err = db
            .place_order(Canteen::It, &tea.id, "asha", "1000".into(), Utc::now())
            .unwrap_err();

        assert!(matches!(err, StoreError::NotFound("item")));
        assert_eq!(db.get_item(Canteen::Mba, &tea.id).unwrap().quantity_sold, 0);
        assert!(db.orders_for_canteen(Canteen::It).unwrap().is_empty());
    }

    #[test]
    fn editing_an_item_keeps_sold_count_and_old_orders() {
        let db = Database::in_memory();
        let samosa = db.create_item(Canteen::Main, "Samosa", 15).unwrap();
        let before = db
            .place_order(Canteen::Main, &samosa.id, "ravi", "2000".into(), Utc::now())
            .unwrap();

        let edited = db
            .update_item(Canteen::Main, &samosa.id, "Jumbo Samosa", 25)
            .unwrap();

        assert_eq!(edited.quantity_sold, 1);
        let orders = db.orders_for_canteen(Canteen::Main).unwrap();
        assert_eq!(orders, vec![before]);
        assert_eq!(orders[0].item_name, "Samosa");
        assert_eq!(orders[0].cost, 15);
    }

    #[test]
    fn deleting_an_item_does_not_cascade() {
        let db = Database::in_memory();
        let coffee = db.create_item(Canteen::It, "Coffee", 20).unwrap();
        db.place_order(Canteen::It, &coffee.id, "asha", "1234".into(), Utc::now())
            .unwrap();

        db.delete_item(Canteen::It, &coffee.id).unwrap();

        assert!(db.list_items(Canteen::It).unwrap().is_empty());
        assert_eq!(db.orders_for_user("asha").unwrap().len(), 1);
        assert!(matches!(
            db.delete_item(Canteen::It, &coffee.id),
            Err(StoreError::NotFound("item"))
        ));
    }

    #[test]
    fn orders_are_listed_newest_first() {
        let db = Database::in_memory();
        let coffee = db.create_item(Canteen::It, "Coffee", 20).unwrap();
        let now = Utc::now();
        let old = db
            .place_order(Canteen::It, &coffee.id, "asha", "1111".into(), now - Duration::minutes(5))
            .unwrap();
        let new = db
            .place_order(Canteen::It, &coffee.id, "asha", "2222".into(), now)
            .unwrap();

        assert_eq!(db.orders_for_user("asha").unwrap(), vec![new, old]);
    }

    #[test]
    fn duplicate_username_is_a_conflict() {
        let db = Database::in_memory();
        db.insert_credential(Role::User, credential("asha")).unwrap();

        assert!(matches!(
            db.insert_credential(Role::User, credential("asha")),
            Err(StoreError::Conflict("username"))
        ));
        // Admins live in their own collection.
        db.insert_credential(Role::Admin, credential("asha")).unwrap();
        assert!(db.find_credential(Role::User, "Asha").unwrap().is_none());
    }

    #[test]
    fn document_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let db = Database::open(dir.path()).unwrap();
            let coffee = db.create_item(Canteen::It, "Coffee", 20).unwrap();
            db.place_order(Canteen::It, &coffee.id, "asha", "4321".into(), Utc::now())
                .unwrap();
            db.insert_credential(Role::User, credential("asha")).unwrap();
            coffee.id
        };

        let reopened = Database::open(dir.path()).unwrap();
        assert_eq!(reopened.get_item(Canteen::It, &id).unwrap().quantity_sold, 1);
        assert_eq!(reopened.orders_for_user("asha").unwrap().len(), 1);
        assert!(reopened.find_credential(Role::User, "asha").unwrap().is_some());

        let raw = fs::read_to_string(dir.path().join(DOCUMENT_FILE)).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        for collection in ["items", "items1", "items2", "orders", "user_detail", "admin"] {
            assert!(doc.get(collection).is_some(), "missing {collection}");
        }
        assert_eq!(doc["orders"][0]["canteen"], "IT");
    }

    #[test]
    fn concurrent_signups_for_one_name_have_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();

        let wins = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| db.insert_credential(Role::User, credential("asha"))))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|result| result.is_ok())
                .count()
        });

        assert_eq!(wins, 1);
        let reopened = Database::open(dir.path()).unwrap();
        let stored = reopened.read(|s| s.user_detail.len()).unwrap();
        assert_eq!(stored, 1);
    }

    #[test]
    fn concurrent_orders_keep_counter_and_log_in_step() {
        const BUYERS: usize = 16;
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let coffee = db.create_item(Canteen::It, "Coffee", 20).unwrap();

        std::thread::scope(|scope| {
            for n in 0..BUYERS {
                let (db, id) = (&db, &coffee.id);
                scope.spawn(move || {
                    db.place_order(Canteen::It, id, &format!("user{n}"), "1000".into(), Utc::now())
                        .unwrap();
                });
            }
        });

        let reopened = Database::open(dir.path()).unwrap();
        let sold = reopened.get_item(Canteen::It, &coffee.id).unwrap().quantity_sold;
        let orders = reopened.orders_for_canteen(Canteen::It).unwrap();
        assert_eq!(sold, BUYERS as u64);
        assert_eq!(orders.len(), BUYERS);
    }

    #[test]
    fn failed_write_leaves_snapshot_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let coffee = db.create_item(Canteen::It, "Coffee", 20).unwrap();

        // Pull the directory out from under the store so the next write fails.
        fs::remove_dir_all(dir.path()).unwrap();
        let result = db.place_order(Canteen::It, &coffee.id, "asha", "5555".into(), Utc::now());

        assert!(matches!(result, Err(StoreError::Io(_))));
        assert_eq!(db.get_item(Canteen::It, &coffee.id).unwrap().quantity_sold, 0);
        assert!(db.orders_for_user("asha").unwrap().is_empty());
    }
}
