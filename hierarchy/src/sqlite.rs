//! SQLite-backed hierarchy store
//!
//! Metadata and raw content share one database file. Reads apply the same
//! visibility rules as [`crate::MemoryHierarchy`].

use crate::errors::{EntityKind, HierarchyError, Result};
use crate::ids::{ChunkId, ContentRef, DirectoryId, DocumentId, LineageId, SubtenantId};
use crate::model::{
    Chunk, Directory, Document, NewChunk, NewDocument, NewVersion, Ownership, TenantScope,
    VersionPolicy,
};
use crate::path;
use crate::store::{DirectoryRef, HierarchyStore, HierarchyWriter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("../HIERARCHY_SCHEMA.sql");

const DIRECTORY_COLUMNS: &str = "id, name, path, parent_id, summary, owner, private, created_at";
const DOCUMENT_COLUMNS: &str = "id, lineage_id, name, directory_id, version, summary, owner, \
     private, content_id, original_filename, mime_type, created_at";
const CHUNK_COLUMNS: &str = "id, document_id, ordinal, title, summary, content_id, created_at";

pub struct SqliteHierarchy {
    conn: Mutex<Connection>,
    root: DirectoryId,
}

impl SqliteHierarchy {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                HierarchyError::storage_with_source(
                    format!("failed to create db directory: {}", parent.display()),
                    e,
                )
            })?;
        }
        let conn = Connection::open(path).map_err(|e| {
            HierarchyError::storage_with_source(
                format!("failed to open db at {}", path.display()),
                e,
            )
        })?;
        let store = Self::init(conn)?;
        tracing::debug!(path = %path.display(), "hierarchy db initialized");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| HierarchyError::storage_with_source("failed to open in-memory db", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(db("failed to apply schema"))?;
        let root = ensure_root(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            root,
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| HierarchyError::storage("sqlite connection lock poisoned"))?;
        f(&conn)
    }
}

fn db(context: &'static str) -> impl FnOnce(rusqlite::Error) -> HierarchyError {
    move |e| HierarchyError::storage_with_source(context, e)
}

fn ensure_root(conn: &Connection) -> Result<DirectoryId> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM directories WHERE parent_id IS NULL",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(db("failed to look up root"))?;
    if let Some(raw) = existing {
        return raw
            .parse()
            .map_err(|e| HierarchyError::storage_with_source("malformed root id", e));
    }

    let id = DirectoryId::new();
    conn.execute(
        "INSERT INTO directories (id, name, path, parent_id, created_at) VALUES (?1, '', ?2, NULL, ?3)",
        params![id.to_string(), path::ROOT, Utc::now().to_rfc3339()],
    )
    .map_err(db("failed to create root"))?;
    Ok(id)
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn conversion(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_col<T: FromStr>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|_| conversion(idx, format!("malformed value {raw:?}")))
}

fn parse_opt_col<T: FromStr>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| {
        value
            .parse()
            .map_err(|_| conversion(idx, format!("malformed value {value:?}")))
    })
    .transpose()
}

fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn ownership_cols(row: &Row<'_>, owner_idx: usize, private_idx: usize) -> rusqlite::Result<Ownership> {
    let owner: Option<SubtenantId> = parse_opt_col(row, owner_idx)?;
    let private: bool = row.get(private_idx)?;
    Ownership::new(owner, private).map_err(|e| conversion(private_idx, e.to_string()))
}

fn directory_row(row: &Row<'_>) -> rusqlite::Result<Directory> {
    Ok(Directory {
        id: parse_col(row, 0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        parent: parse_opt_col(row, 3)?,
        summary: row.get(4)?,
        ownership: ownership_cols(row, 5, 6)?,
        created_at: time_col(row, 7)?,
    })
}

fn document_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: parse_col(row, 0)?,
        lineage: parse_col(row, 1)?,
        name: row.get(2)?,
        directory_id: parse_col(row, 3)?,
        version: row.get(4)?,
        summary: row.get(5)?,
        ownership: ownership_cols(row, 6, 7)?,
        content: parse_col(row, 8)?,
        original_filename: row.get(9)?,
        mime_type: row.get(10)?,
        created_at: time_col(row, 11)?,
    })
}

fn chunk_row(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: parse_col(row, 0)?,
        document_id: parse_col(row, 1)?,
        ordinal: row.get(2)?,
        title: row.get(3)?,
        summary: row.get(4)?,
        content: parse_col(row, 5)?,
        created_at: time_col(row, 6)?,
    })
}

fn owner_text(ownership: &Ownership) -> Option<String> {
    ownership.owner().map(|owner| owner.to_string())
}

fn scope_key_text(ownership: &Ownership) -> String {
    ownership
        .scope_key()
        .map(|owner| owner.to_string())
        .unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Queries
// ─────────────────────────────────────────────────────────────────────────────

fn load_directory(conn: &Connection, id: DirectoryId) -> Result<Directory> {
    conn.query_row(
        &format!("SELECT {DIRECTORY_COLUMNS} FROM directories WHERE id = ?1"),
        params![id.to_string()],
        directory_row,
    )
    .optional()
    .map_err(db("failed to load directory"))?
    .ok_or_else(|| HierarchyError::not_found(EntityKind::Directory, id))
}

fn load_document(conn: &Connection, id: DocumentId) -> Result<Document> {
    conn.query_row(
        &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
        params![id.to_string()],
        document_row,
    )
    .optional()
    .map_err(db("failed to load document"))?
    .ok_or_else(|| HierarchyError::not_found(EntityKind::Document, id))
}

fn load_chunk(conn: &Connection, id: ChunkId) -> Result<Chunk> {
    conn.query_row(
        &format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id = ?1"),
        params![id.to_string()],
        chunk_row,
    )
    .optional()
    .map_err(db("failed to load chunk"))?
    .ok_or_else(|| HierarchyError::not_found(EntityKind::Chunk, id))
}

fn load_content(conn: &Connection, reference: ContentRef) -> Result<String> {
    conn.query_row(
        "SELECT body FROM contents WHERE id = ?1",
        params![reference.to_string()],
        |row| row.get(0),
    )
    .optional()
    .map_err(db("failed to load content"))?
    .ok_or_else(|| HierarchyError::not_found(EntityKind::Content, reference))
}

fn require_content(conn: &Connection, reference: ContentRef) -> Result<()> {
    load_content(conn, reference).map(|_| ())
}

fn find_by_key(conn: &Connection, scope_key: &str, path: &str) -> Result<Option<Directory>> {
    conn.query_row(
        &format!("SELECT {DIRECTORY_COLUMNS} FROM directories WHERE scope_key = ?1 AND path = ?2"),
        params![scope_key, path],
        directory_row,
    )
    .optional()
    .map_err(db("failed to look up directory path"))
}

/// Caller's private directory first, then the shared one.
fn lookup_path(conn: &Connection, path: &str, scope: &TenantScope) -> Result<Option<Directory>> {
    if let Some(owner) = scope.subtenant() {
        if let Some(dir) = find_by_key(conn, &owner.to_string(), path)? {
            return Ok(Some(dir));
        }
    }
    find_by_key(conn, "", path)
}

fn chain_visible(conn: &Connection, id: DirectoryId, scope: &TenantScope) -> Result<bool> {
    let mut stmt = conn
        .prepare_cached(
            r#"
            WITH RECURSIVE chain(id, parent_id, owner, private, depth) AS (
                SELECT id, parent_id, owner, private, 0 FROM directories WHERE id = ?1
                UNION ALL
                SELECT d.id, d.parent_id, d.owner, d.private, c.depth + 1
                FROM directories d JOIN chain c ON d.id = c.parent_id
                WHERE c.depth < 4096
            )
            SELECT owner, private FROM chain
            "#,
        )
        .map_err(db("failed to prepare chain query"))?;
    let rows = stmt
        .query_map(params![id.to_string()], |row| ownership_cols(row, 0, 1))
        .map_err(db("failed to walk directory chain"))?;
    let mut seen = false;
    for ownership in rows {
        let ownership = ownership.map_err(db("failed to read directory chain"))?;
        seen = true;
        if !ownership.visible_to(scope) {
            return Ok(false);
        }
    }
    Ok(seen)
}

fn scoped_directory(conn: &Connection, id: DirectoryId, scope: &TenantScope) -> Result<Directory> {
    let dir = load_directory(conn, id)?;
    if !chain_visible(conn, id, scope)? {
        return Err(HierarchyError::tenant_violation(
            EntityKind::Directory,
            id,
            scope,
        ));
    }
    Ok(dir)
}

fn scoped_document(conn: &Connection, id: DocumentId, scope: &TenantScope) -> Result<Document> {
    let doc = load_document(conn, id)?;
    if !doc.ownership.visible_to(scope) || !chain_visible(conn, doc.directory_id, scope)? {
        return Err(HierarchyError::tenant_violation(
            EntityKind::Document,
            id,
            scope,
        ));
    }
    Ok(doc)
}

fn children(conn: &Connection, id: DirectoryId) -> Result<Vec<Directory>> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {DIRECTORY_COLUMNS} FROM directories WHERE parent_id = ?1 ORDER BY path, id"
        ))
        .map_err(db("failed to prepare children query"))?;
    let rows = stmt
        .query_map(params![id.to_string()], directory_row)
        .map_err(db("failed to list children"))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db("failed to read children"))
}

fn documents(conn: &Connection, id: DirectoryId) -> Result<Vec<Document>> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE directory_id = ?1"
        ))
        .map_err(db("failed to prepare documents query"))?;
    let rows = stmt
        .query_map(params![id.to_string()], document_row)
        .map_err(db("failed to list documents"))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db("failed to read documents"))
}

fn chunks(conn: &Connection, id: DocumentId) -> Result<Vec<Chunk>> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks WHERE document_id = ?1 ORDER BY ordinal"
        ))
        .map_err(db("failed to prepare chunks query"))?;
    let rows = stmt
        .query_map(params![id.to_string()], chunk_row)
        .map_err(db("failed to list chunks"))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db("failed to read chunks"))
}

fn insert_directory(
    conn: &Connection,
    parent: &Directory,
    name: &str,
    ownership: Ownership,
) -> Result<Directory> {
    let dir = Directory {
        id: DirectoryId::new(),
        name: name.to_string(),
        path: path::join(&parent.path, name),
        parent: Some(parent.id),
        summary: None,
        ownership,
        created_at: Utc::now(),
    };
    conn.execute(
        r#"
        INSERT INTO directories (id, name, path, parent_id, owner, private, scope_key, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            dir.id.to_string(),
            dir.name,
            dir.path,
            parent.id.to_string(),
            owner_text(&ownership),
            ownership.is_private(),
            scope_key_text(&ownership),
            dir.created_at.to_rfc3339(),
        ],
    )
    .map_err(db("failed to insert directory"))?;
    tracing::debug!(path = %dir.path, id = %dir.id, "created directory");
    Ok(dir)
}

fn insert_document(conn: &Connection, doc: &Document) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO documents
            (id, lineage_id, name, directory_id, version, owner, private, content_id,
             original_filename, mime_type, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            doc.id.to_string(),
            doc.lineage.to_string(),
            doc.name,
            doc.directory_id.to_string(),
            doc.version,
            owner_text(&doc.ownership),
            doc.ownership.is_private(),
            doc.content.to_string(),
            doc.original_filename,
            doc.mime_type,
            doc.created_at.to_rfc3339(),
        ],
    )
    .map_err(db("failed to insert document"))?;
    Ok(())
}

fn update_summary(conn: &Connection, sql: &str, id: String, summary: String, entity: EntityKind) -> Result<()> {
    let changed = conn
        .execute(sql, params![id, summary])
        .map_err(db("failed to update summary"))?;
    if changed == 0 {
        return Err(HierarchyError::not_found(entity, id));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait impls
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl HierarchyStore for SqliteHierarchy {
    async fn root(&self) -> Result<Directory> {
        self.with_conn(|conn| load_directory(conn, self.root))
    }

    async fn directory(
        &self,
        reference: DirectoryRef<'_>,
        scope: &TenantScope,
    ) -> Result<Directory> {
        self.with_conn(|conn| match reference {
            DirectoryRef::Id(id) => scoped_directory(conn, id, scope),
            DirectoryRef::Path(raw) => {
                path::validate(raw)?;
                let found = lookup_path(conn, raw, scope)?;
                match found {
                    Some(dir) if chain_visible(conn, dir.id, scope)? => Ok(dir),
                    _ => Err(HierarchyError::not_found(EntityKind::Directory, raw)),
                }
            }
        })
    }

    async fn list_children(&self, id: DirectoryId, scope: &TenantScope) -> Result<Vec<Directory>> {
        self.with_conn(|conn| {
            scoped_directory(conn, id, scope)?;
            Ok(children(conn, id)?
                .into_iter()
                .filter(|dir| dir.ownership.visible_to(scope))
                .collect())
        })
    }

    async fn list_documents(
        &self,
        id: DirectoryId,
        scope: &TenantScope,
        policy: &VersionPolicy,
    ) -> Result<Vec<Document>> {
        self.with_conn(|conn| {
            scoped_directory(conn, id, scope)?;
            let visible = documents(conn, id)?
                .into_iter()
                .filter(|doc| doc.ownership.visible_to(scope))
                .collect();
            Ok(policy.apply(visible))
        })
    }

    async fn list_chunks(&self, document: DocumentId, scope: &TenantScope) -> Result<Vec<Chunk>> {
        self.with_conn(|conn| {
            scoped_document(conn, document, scope)?;
            chunks(conn, document)
        })
    }

    async fn chunk_content(&self, chunk: ChunkId, scope: &TenantScope) -> Result<String> {
        self.with_conn(|conn| {
            let record = load_chunk(conn, chunk)?;
            scoped_document(conn, record.document_id, scope).map_err(|err| match err {
                HierarchyError::TenantViolation { scope, .. } => HierarchyError::TenantViolation {
                    entity: EntityKind::Chunk,
                    key: chunk.to_string(),
                    scope,
                },
                other => other,
            })?;
            load_content(conn, record.content)
        })
    }
}

#[async_trait]
impl HierarchyWriter for SqliteHierarchy {
    async fn ensure_directory(&self, raw: &str, ownership: Ownership) -> Result<Directory> {
        path::validate(raw)?;
        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(db("failed to begin transaction"))?;
            let lookup_scope = ownership.as_scope();
            let segments = path::segments(raw);
            let mut current = load_directory(&tx, self.root)?;

            for (index, segment) in segments.iter().enumerate() {
                let child_path = path::join(&current.path, segment);
                let is_target = index + 1 == segments.len();
                let existing = if is_target {
                    find_by_key(&tx, &scope_key_text(&ownership), &child_path)?
                } else {
                    lookup_path(&tx, &child_path, &lookup_scope)?
                };

                current = match existing {
                    Some(dir) if is_target && dir.ownership != ownership => {
                        return Err(HierarchyError::conflict(format!(
                            "{child_path} already exists with different ownership"
                        )));
                    }
                    Some(dir) if !chain_visible(&tx, dir.id, &lookup_scope)? => {
                        return Err(HierarchyError::conflict(format!(
                            "{child_path} belongs to another sub-tenant"
                        )));
                    }
                    Some(dir) => dir,
                    None => {
                        if !ownership.may_nest_under(&current.ownership) {
                            return Err(HierarchyError::conflict(format!(
                                "cannot create {child_path} under a directory owned by another sub-tenant"
                            )));
                        }
                        insert_directory(&tx, &current, segment, ownership)?
                    }
                };
            }
            tx.commit().map_err(db("failed to commit directories"))?;
            Ok(current)
        })
    }

    async fn get_directory(&self, id: DirectoryId) -> Result<Directory> {
        self.with_conn(|conn| load_directory(conn, id))
    }

    async fn put_content(&self, text: String) -> Result<ContentRef> {
        let reference = ContentRef::new();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO contents (id, body) VALUES (?1, ?2)",
                params![reference.to_string(), text],
            )
            .map_err(db("failed to store content"))?;
            Ok(reference)
        })
    }

    async fn content(&self, reference: ContentRef) -> Result<String> {
        self.with_conn(|conn| load_content(conn, reference))
    }

    async fn create_document(&self, new: NewDocument) -> Result<Document> {
        self.with_conn(|conn| {
            let dir = load_directory(conn, new.directory_id)?;
            if !new.ownership.may_nest_under(&dir.ownership) {
                return Err(HierarchyError::conflict(format!(
                    "document {} cannot live in {} owned by another sub-tenant",
                    new.name, dir.path
                )));
            }
            require_content(conn, new.content)?;
            let doc = Document {
                id: DocumentId::new(),
                lineage: LineageId::new(),
                name: new.name,
                directory_id: new.directory_id,
                version: 1,
                summary: None,
                ownership: new.ownership,
                content: new.content,
                original_filename: new.original_filename,
                mime_type: new.mime_type,
                created_at: Utc::now(),
            };
            insert_document(conn, &doc)?;
            Ok(doc)
        })
    }

    async fn create_next_version(&self, lineage: LineageId, new: NewVersion) -> Result<Document> {
        self.with_conn(|conn| {
            let previous = conn
                .query_row(
                    &format!(
                        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE lineage_id = ?1 \
                         ORDER BY version DESC LIMIT 1"
                    ),
                    params![lineage.to_string()],
                    document_row,
                )
                .optional()
                .map_err(db("failed to load lineage"))?
                .ok_or_else(|| HierarchyError::not_found(EntityKind::Lineage, lineage))?;
            require_content(conn, new.content)?;
            let doc = Document {
                id: DocumentId::new(),
                lineage,
                name: previous.name,
                directory_id: previous.directory_id,
                version: previous.version + 1,
                summary: None,
                ownership: previous.ownership,
                content: new.content,
                original_filename: new.original_filename,
                mime_type: new.mime_type,
                created_at: Utc::now(),
            };
            insert_document(conn, &doc)?;
            Ok(doc)
        })
    }

    async fn attach_chunks(
        &self,
        document: DocumentId,
        new_chunks: Vec<NewChunk>,
    ) -> Result<Vec<Chunk>> {
        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(db("failed to begin transaction"))?;
            load_document(&tx, document)?;
            let claimed = tx
                .execute(
                    "UPDATE documents SET chunks_attached = 1 WHERE id = ?1 AND chunks_attached = 0",
                    params![document.to_string()],
                )
                .map_err(db("failed to claim document"))?;
            if claimed == 0 {
                return Err(HierarchyError::conflict(format!(
                    "document {document} already has chunks"
                )));
            }

            let now = Utc::now();
            let mut created = Vec::with_capacity(new_chunks.len());
            for (index, chunk) in new_chunks.into_iter().enumerate() {
                require_content(&tx, chunk.content)?;
                let ordinal = u32::try_from(index)
                    .map_err(|_| HierarchyError::conflict("too many chunks for one document"))?;
                let record = Chunk {
                    id: ChunkId::new(),
                    document_id: document,
                    ordinal,
                    title: chunk.title,
                    summary: None,
                    content: chunk.content,
                    created_at: now,
                };
                tx.execute(
                    r#"
                    INSERT INTO chunks (id, document_id, ordinal, title, content_id, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                    params![
                        record.id.to_string(),
                        document.to_string(),
                        record.ordinal,
                        record.title,
                        record.content.to_string(),
                        now.to_rfc3339(),
                    ],
                )
                .map_err(db("failed to insert chunk"))?;
                created.push(record);
            }
            tx.commit().map_err(db("failed to commit chunks"))?;
            Ok(created)
        })
    }

    async fn document(&self, id: DocumentId) -> Result<Document> {
        self.with_conn(|conn| load_document(conn, id))
    }

    async fn lineage_versions(&self, lineage: LineageId) -> Result<Vec<Document>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare_cached(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE lineage_id = ?1 ORDER BY version"
                ))
                .map_err(db("failed to prepare lineage query"))?;
            let versions = stmt
                .query_map(params![lineage.to_string()], document_row)
                .map_err(db("failed to list lineage"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db("failed to read lineage"))?;
            if versions.is_empty() {
                return Err(HierarchyError::not_found(EntityKind::Lineage, lineage));
            }
            Ok(versions)
        })
    }

    async fn children_of(&self, id: DirectoryId) -> Result<Vec<Directory>> {
        self.with_conn(|conn| {
            load_directory(conn, id)?;
            children(conn, id)
        })
    }

    async fn documents_in(&self, id: DirectoryId) -> Result<Vec<Document>> {
        self.with_conn(|conn| {
            load_directory(conn, id)?;
            Ok(VersionPolicy::Latest.apply(documents(conn, id)?))
        })
    }

    async fn chunks_of(&self, document: DocumentId) -> Result<Vec<Chunk>> {
        self.with_conn(|conn| {
            load_document(conn, document)?;
            chunks(conn, document)
        })
    }

    async fn set_directory_summary(&self, id: DirectoryId, summary: String) -> Result<()> {
        self.with_conn(|conn| {
            update_summary(
                conn,
                "UPDATE directories SET summary = ?2 WHERE id = ?1",
                id.to_string(),
                summary,
                EntityKind::Directory,
            )
        })
    }

    async fn set_document_summary(&self, id: DocumentId, summary: String) -> Result<()> {
        self.with_conn(|conn| {
            update_summary(
                conn,
                "UPDATE documents SET summary = ?2 WHERE id = ?1",
                id.to_string(),
                summary,
                EntityKind::Document,
            )
        })
    }

    async fn set_chunk_summary(&self, id: ChunkId, summary: String) -> Result<()> {
        self.with_conn(|conn| {
            update_summary(
                conn,
                "UPDATE chunks SET summary = ?2 WHERE id = ?1",
                id.to_string(),
                summary,
                EntityKind::Chunk,
            )
        })
    }
}
