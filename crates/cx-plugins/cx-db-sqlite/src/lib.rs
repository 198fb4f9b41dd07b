//! # cx-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `cx-core` domain models.

mod rows;
mod tx;

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use cx_core::models::{
    AuditFields, Director, Genre, Movie, MovieView, NewDirector, NewGenre, NewUser, Reaction, User,
};
use cx_core::pagination::{CursorValue, PageWindow};
use cx_core::traits::{CatalogRepo, CatalogTx, ReactionRepo, UserRepo};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};

use rows::{column, push_id_list, write_error, MOVIE_COLUMNS};
pub use tx::SqliteTx;

/// How long a connection waits on another writer's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed catalog, reaction and user store.
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    /// Connects and brings the schema up to date.
    ///
    /// In-memory databases live as long as their connection, so they get a
    /// single connection that is never recycled. File databases run in WAL
    /// mode so readers never wait on the writer.
    pub async fn new(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { max_connections.max(1) })
            .min_connections(if in_memory { 1 } else { 0 })
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> anyhow::Result<Self> {
        MIGRATOR.run(&pool).await?;
        tracing::debug!("catalog schema is up to date");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Attaches director and genres to each movie, preserving order.
    async fn join_relations(&self, movies: Vec<Movie>) -> anyhow::Result<Vec<MovieView>> {
        let movie_ids: Vec<i64> = movies.iter().map(|m| m.id).collect();
        let mut director_ids: Vec<i64> = movies.iter().map(|m| m.director_id).collect();
        director_ids.sort_unstable();
        director_ids.dedup();

        let directors: HashMap<i64, Director> = rows::select_directors(&self.pool, &director_ids)
            .await?
            .into_iter()
            .map(|d| (d.id, d))
            .collect();

        let mut genres: HashMap<i64, Vec<Genre>> = HashMap::new();
        for (movie_id, genre) in rows::select_movie_genres(&self.pool, &movie_ids).await? {
            genres.entry(movie_id).or_default().push(genre);
        }

        movies
            .into_iter()
            .map(|movie| {
                let director = directors
                    .get(&movie.director_id)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("movie {} references missing director {}", movie.id, movie.director_id))?;
                Ok(MovieView {
                    genres: genres.remove(&movie.id).unwrap_or_default(),
                    director,
                    detail: None,
                    creator: None,
                    movie,
                })
            })
            .collect()
    }
}

#[async_trait]
impl CatalogRepo for SqliteCatalog {
    /// Write sessions take the write lock up front. A deferred transaction
    /// reads first and then fails with `SQLITE_BUSY` on the lock upgrade when
    /// another writer got there in between, which `busy_timeout` cannot retry.
    async fn begin(&self) -> anyhow::Result<Box<dyn CatalogTx>> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Ok(Box::new(SqliteTx::new(tx)))
    }

    async fn find_movie(&self, id: i64) -> anyhow::Result<Option<Movie>> {
        Ok(rows::select_movie(&self.pool, id).await?)
    }

    async fn find_movie_view(&self, id: i64) -> anyhow::Result<Option<MovieView>> {
        let Some(movie) = rows::select_movie(&self.pool, id).await? else {
            return Ok(None);
        };
        let detail = rows::select_detail(&self.pool, movie.detail_id).await?;
        let creator = self.find_user(movie.creator_id).await?;

        let mut views = self.join_relations(vec![movie]).await?;
        Ok(views.pop().map(|view| MovieView { detail, creator, ..view }))
    }

    async fn list_movies(&self, title: Option<&str>, window: &PageWindow) -> anyhow::Result<Vec<MovieView>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {MOVIE_COLUMNS} FROM movies m WHERE 1 = 1"));

        if let Some(title) = title {
            qb.push(" AND m.title LIKE ").push_bind(format!("%{title}%"));
        }

        let seek = window.seek_terms();
        if !seek.is_empty() {
            qb.push(" AND (");
            for (i, conjunction) in seek.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push("(");
                for (j, term) in conjunction.iter().enumerate() {
                    if j > 0 {
                        qb.push(" AND ");
                    }
                    qb.push(format!("{} {} ", column(term.field), term.op.sql()));
                    match term.value {
                        CursorValue::Int(value) => qb.push_bind(*value),
                        CursorValue::Text(value) => qb.push_bind(value.clone()),
                    };
                }
                qb.push(")");
            }
            qb.push(")");
        }

        qb.push(" ORDER BY ");
        for (i, key) in window.order().iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(format!("{} {}", column(key.field), key.direction.name()));
        }
        qb.push(" LIMIT ").push_bind(window.take());

        let movies = qb
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(rows::movie_from_row)
            .collect::<sqlx::Result<Vec<_>>>()?;

        self.join_relations(movies).await
    }

    async fn count_movies(&self, title: Option<&str>) -> anyhow::Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM movies m");
        if let Some(title) = title {
            qb.push(" WHERE m.title LIKE ").push_bind(format!("%{title}%"));
        }
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn recent_movies(&self, limit: i64) -> anyhow::Result<Vec<Movie>> {
        let sql = format!("SELECT {MOVIE_COLUMNS} FROM movies m ORDER BY m.created_at DESC, m.id DESC LIMIT ?");
        let movies = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(rows::movie_from_row)
            .collect::<sqlx::Result<Vec<_>>>()?;
        Ok(movies)
    }

    async fn delete_movie(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM movies WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_detail(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM movie_details WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_director(&self, director: &NewDirector) -> anyhow::Result<Director> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO directors (name, dob, nationality, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(director.name.as_str())
        .bind(director.dob)
        .bind(director.nationality.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Director {
            id: result.last_insert_rowid(),
            name: director.name.clone(),
            dob: director.dob,
            nationality: director.nationality.clone(),
            audit: AuditFields::new(now),
        })
    }

    async fn list_directors(&self) -> anyhow::Result<Vec<Director>> {
        let records = sqlx::query("SELECT * FROM directors ORDER BY id").fetch_all(&self.pool).await?;
        Ok(records.iter().map(rows::director_from_row).collect::<sqlx::Result<Vec<_>>>()?)
    }

    async fn insert_genre(&self, genre: &NewGenre) -> anyhow::Result<Genre> {
        let now = Utc::now();
        let result = sqlx::query("INSERT INTO genres (name, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(genre.name.as_str())
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| write_error(e, &format!("genre `{}`", genre.name)))?;

        Ok(Genre { id: result.last_insert_rowid(), name: genre.name.clone(), audit: AuditFields::new(now) })
    }

    async fn list_genres(&self) -> anyhow::Result<Vec<Genre>> {
        let records = sqlx::query("SELECT * FROM genres ORDER BY id").fetch_all(&self.pool).await?;
        Ok(records.iter().map(rows::genre_from_row).collect::<sqlx::Result<Vec<_>>>()?)
    }
}

#[async_trait]
impl ReactionRepo for SqliteCatalog {
    async fn find_reaction(&self, movie_id: i64, user_id: i64) -> anyhow::Result<Option<Reaction>> {
        let row = sqlx::query("SELECT * FROM movie_user_likes WHERE movie_id = ? AND user_id = ?")
            .bind(movie_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(rows::reaction_from_row).transpose()?)
    }

    async fn reactions_for_user(&self, user_id: i64, movie_ids: &[i64]) -> anyhow::Result<Vec<Reaction>> {
        if movie_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM movie_user_likes WHERE user_id = ");
        qb.push_bind(user_id).push(" AND movie_id IN ");
        push_id_list(&mut qb, movie_ids);

        let records = qb.build().fetch_all(&self.pool).await?;
        Ok(records.iter().map(rows::reaction_from_row).collect::<sqlx::Result<Vec<_>>>()?)
    }

    async fn insert_reaction(&self, reaction: &Reaction) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO movie_user_likes (movie_id, user_id, is_like) VALUES (?, ?, ?)")
            .bind(reaction.movie_id)
            .bind(reaction.user_id)
            .bind(reaction.is_like)
            .execute(&self.pool)
            .await
            .map_err(|e| write_error(e, "reaction"))?;
        Ok(())
    }

    async fn update_reaction(&self, movie_id: i64, user_id: i64, is_like: bool) -> anyhow::Result<()> {
        sqlx::query("UPDATE movie_user_likes SET is_like = ? WHERE movie_id = ? AND user_id = ?")
            .bind(is_like)
            .bind(movie_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_reaction(&self, movie_id: i64, user_id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM movie_user_likes WHERE movie_id = ? AND user_id = ?")
            .bind(movie_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UserRepo for SqliteCatalog {
    async fn find_user(&self, id: i64) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(rows::user_from_row).transpose()?)
    }

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(rows::user_from_row).transpose()?)
    }

    async fn insert_user(&self, user: &NewUser) -> anyhow::Result<User> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (email, password, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.email.as_str())
        .bind(user.password_hash.as_str())
        .bind(i64::from(user.role.rank()))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, &format!("user with email `{}`", user.email)))?;

        Ok(User {
            id: result.last_insert_rowid(),
            email: user.email.clone(),
            password: user.password_hash.clone(),
            role: user.role,
            audit: AuditFields::new(now),
        })
    }
}
