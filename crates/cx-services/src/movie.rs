//! Aggregate write/read engine for movies and their relations.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use cx_core::error::{AppError, Result};
use cx_core::models::{
    CreateMovie, Director, Genre, Movie, MovieFieldUpdate, MovieInsert, MovieListItem, MoviePage,
    MovieView, NewDirector, NewGenre, UpdateMovie,
};
use cx_core::pagination::{PageRequest, PageWindow};
use cx_core::traits::{Cache, CatalogRepo, CatalogTx, MediaStore, ReactionRepo};

/// Cache key holding the serialized recency view.
pub const RECENT_CACHE_KEY: &str = "MOVIE_RECENT";
pub const RECENT_LIMIT: i64 = 10;

pub struct MovieService {
    catalog: Arc<dyn CatalogRepo>,
    reactions: Arc<dyn ReactionRepo>,
    cache: Arc<dyn Cache>,
    media: Arc<dyn MediaStore>,
    recent_ttl: Duration,
}

impl MovieService {
    pub fn new(
        catalog: Arc<dyn CatalogRepo>,
        reactions: Arc<dyn ReactionRepo>,
        cache: Arc<dyn Cache>,
        media: Arc<dyn MediaStore>,
        recent_ttl: Duration,
    ) -> Self {
        Self { catalog, reactions, cache, media, recent_ttl }
    }

    /// One page of movies, optionally filtered by a title substring.
    ///
    /// `likeStatus` is attached only when `acting_user` is given.
    #[tracing::instrument(skip(self, request))]
    pub async fn list(&self, title: Option<&str>, request: &PageRequest, acting_user: Option<i64>) -> Result<MoviePage> {
        let window = PageWindow::from_request(request)?;
        let title = title.map(str::trim).filter(|t| !t.is_empty());

        let views = self.catalog.list_movies(title, &window).await?;
        let count = self.catalog.count_movies(title).await?;
        let next_cursor = window.next_cursor(views.last().map(|view| &view.movie));

        let statuses = match acting_user {
            Some(user_id) => Some(self.like_statuses(user_id, &views).await?),
            None => None,
        };

        let data = views
            .into_iter()
            .map(|view| {
                let like_status = statuses.as_ref().map(|s| s.get(&view.movie.id).copied());
                MovieListItem { view, like_status }
            })
            .collect();

        Ok(MoviePage { data, next_cursor, count })
    }

    async fn like_statuses(&self, user_id: i64, views: &[MovieView]) -> Result<HashMap<i64, bool>> {
        let movie_ids: Vec<i64> = views.iter().map(|view| view.movie.id).collect();
        if movie_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let reactions = self.reactions.reactions_for_user(user_id, &movie_ids).await?;
        Ok(reactions.into_iter().map(|r| (r.movie_id, r.is_like)).collect())
    }

    #[tracing::instrument(skip(self))]
    pub async fn detail(&self, id: i64) -> Result<MovieView> {
        self.catalog
            .find_movie_view(id)
            .await?
            .ok_or_else(|| AppError::not_found("movie", id))
    }

    /// Writes the movie, its detail and genre links in one transaction.
    ///
    /// The upload is promoted before commit. A move that succeeded is not
    /// undone if the commit then fails.
    #[tracing::instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create(&self, input: CreateMovie, creator_id: i64) -> Result<MovieView> {
        let mut tx = self.catalog.begin().await?;

        let written = self.write_new(tx.as_mut(), &input, creator_id).await;
        let id = match written {
            Ok(id) => id,
            Err(e) => return Err(abort(tx, e).await),
        };
        tx.commit().await?;
        tracing::debug!(movie_id = id, "movie created");

        self.detail(id).await
    }

    async fn write_new(&self, tx: &mut dyn CatalogTx, input: &CreateMovie, creator_id: i64) -> Result<i64> {
        let director = resolve_director(tx, input.director_id).await?;
        let genres = resolve_genres(tx, &input.genre_ids).await?;

        let detail_id = tx.insert_detail(&input.detail).await?;
        let row = MovieInsert {
            title: input.title.clone(),
            detail_id,
            director_id: director.id,
            creator_id,
            movie_file_path: self.media.permanent_path(&input.movie_file_name),
        };
        let id = tx.insert_movie(&row).await?;

        let genre_ids: Vec<i64> = genres.iter().map(|g| g.id).collect();
        tx.add_genres(id, &genre_ids).await?;

        self.media.promote(&input.movie_file_name).await?;
        Ok(id)
    }

    /// Applies any subset of title, director, genres and detail in one transaction.
    #[tracing::instrument(skip(self, input))]
    pub async fn update(&self, id: i64, input: UpdateMovie) -> Result<MovieView> {
        let mut tx = self.catalog.begin().await?;

        let applied = apply_update(tx.as_mut(), id, &input).await;
        if let Err(e) = applied {
            return Err(abort(tx, e).await);
        }
        tx.commit().await?;
        tracing::debug!(movie_id = id, "movie updated");

        self.detail(id).await
    }

    /// Deletes the movie and then its detail; join rows cascade in the store.
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, id: i64) -> Result<i64> {
        let movie = self
            .catalog
            .find_movie(id)
            .await?
            .ok_or_else(|| AppError::not_found("movie", id))?;

        self.catalog.delete_movie(movie.id).await?;
        self.catalog.delete_detail(movie.detail_id).await?;
        tracing::debug!(movie_id = id, "movie removed");
        Ok(id)
    }

    /// The most recently created movies, served from cache while it is warm.
    ///
    /// Writes do not invalidate the cache; staleness is bounded by its TTL.
    #[tracing::instrument(skip(self))]
    pub async fn recent(&self) -> Result<Vec<Movie>> {
        if let Some(cached) = self.cache.get(RECENT_CACHE_KEY).await? {
            match serde_json::from_str(&cached) {
                Ok(movies) => return Ok(movies),
                Err(e) => tracing::warn!(error = %e, "discarding unreadable recency cache entry"),
            }
        }

        let movies = self.catalog.recent_movies(RECENT_LIMIT).await?;
        let encoded = serde_json::to_string(&movies).map_err(|e| AppError::Internal(e.into()))?;
        self.cache.set(RECENT_CACHE_KEY, encoded, self.recent_ttl).await?;
        Ok(movies)
    }

    pub async fn create_director(&self, director: NewDirector) -> Result<Director> {
        Ok(self.catalog.insert_director(&director).await?)
    }

    pub async fn directors(&self) -> Result<Vec<Director>> {
        Ok(self.catalog.list_directors().await?)
    }

    pub async fn create_genre(&self, genre: NewGenre) -> Result<Genre> {
        Ok(self.catalog.insert_genre(&genre).await?)
    }

    pub async fn genres(&self) -> Result<Vec<Genre>> {
        Ok(self.catalog.list_genres().await?)
    }
}

async fn apply_update(tx: &mut dyn CatalogTx, id: i64, input: &UpdateMovie) -> Result<()> {
    let current = tx
        .load_aggregate(id)
        .await?
        .ok_or_else(|| AppError::not_found("movie", id))?;

    if let Some(director_id) = input.director_id {
        resolve_director(tx, director_id).await?;
    }

    let fields = MovieFieldUpdate { title: input.title.clone(), director_id: input.director_id };
    tx.update_movie(id, &fields).await?;

    if let Some(body) = &input.detail {
        tx.update_detail(current.detail.id, body).await?;
    }

    if let Some(genre_ids) = &input.genre_ids {
        let wanted = resolve_genres(tx, genre_ids).await?;
        let (to_add, to_remove) = genre_diff(&current.genres, &wanted);
        tx.add_genres(id, &to_add).await?;
        tx.remove_genres(id, &to_remove).await?;
    }
    Ok(())
}

/// Rolls the session back and hands the original error back to the caller.
async fn abort(tx: Box<dyn CatalogTx>, err: AppError) -> AppError {
    if let Err(rollback_err) = tx.rollback().await {
        tracing::warn!(error = %rollback_err, "rollback failed");
    }
    err
}

async fn resolve_director(tx: &mut dyn CatalogTx, id: i64) -> Result<Director> {
    tx.find_director(id)
        .await?
        .ok_or_else(|| AppError::not_found("director", id))
}

/// Every requested genre, or `NotFound` naming the ids that do not exist.
async fn resolve_genres(tx: &mut dyn CatalogTx, ids: &[i64]) -> Result<Vec<Genre>> {
    let requested: BTreeSet<i64> = ids.iter().copied().collect();
    let requested: Vec<i64> = requested.into_iter().collect();
    let found = tx.find_genres(&requested).await?;

    if found.len() < requested.len() {
        let missing: Vec<String> = requested
            .iter()
            .filter(|id| !found.iter().any(|g| g.id == **id))
            .map(ToString::to_string)
            .collect();
        return Err(AppError::not_found("genre", missing.join(", ")));
    }
    Ok(found)
}

/// Ids to link and unlink so the joined set becomes `wanted`.
fn genre_diff(current: &[Genre], wanted: &[Genre]) -> (Vec<i64>, Vec<i64>) {
    let current: BTreeSet<i64> = current.iter().map(|g| g.id).collect();
    let wanted: BTreeSet<i64> = wanted.iter().map(|g| g.id).collect();
    (
        wanted.difference(&current).copied().collect(),
        current.difference(&wanted).copied().collect(),
    )
}
