//! Library records
//!
//! Books, authors and categories, the book form rules, the filter applied to
//! a user's collection and the JSON view handed to clients.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

const MAX_STRING_LEN: usize = 255;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: u64,
    pub user_id: u64,
    pub title: String,
    pub author: Option<Author>,
    pub isbn: Option<String>,
    pub description: Option<String>,
    /// Stored cover filename, not a URL.
    pub cover_image: Option<String>,
    pub is_read: bool,
    pub rating: Option<u8>,
    pub notes: Option<String>,
    pub categories: Vec<Category>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn author_id(&self) -> Option<u64> {
        self.author.as_ref().map(|a| a.id)
    }

    pub fn is_owned_by(&self, user_id: u64) -> bool {
        self.user_id == user_id
    }

    pub fn toggle_read(&mut self, now: DateTime<Utc>) {
        self.is_read = !self.is_read;
        self.updated_at = now;
    }
}

/// Author field of the book form: pick an existing author or type a new one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthorChoice {
    #[default]
    None,
    Existing(u64),
    New(String),
}

#[derive(Debug, Clone, Default)]
pub struct BookForm {
    pub title: String,
    pub author: AuthorChoice,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub category_ids: Vec<u64>,
    pub is_read: bool,
    pub rating: Option<i64>,
    pub notes: Option<String>,
}

fn check_len(field: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if v.chars().count() > MAX_STRING_LEN => Err(Error::validation(
            field,
            format!("The {} may not be greater than {} characters.", field, MAX_STRING_LEN),
        )),
        _ => Ok(()),
    }
}

impl BookForm {
    pub fn validate(&self, authors: &[Author], categories: &[Category]) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation("title", "The title field is required."));
        }
        check_len("title", Some(self.title.as_str()))?;
        check_len("isbn", self.isbn.as_deref())?;

        match &self.author {
            AuthorChoice::None => {}
            AuthorChoice::Existing(id) => {
                if !authors.iter().any(|a| a.id == *id) {
                    return Err(Error::validation("author_id", "The selected author is invalid."));
                }
            }
            AuthorChoice::New(name) => {
                if name.trim().is_empty() {
                    return Err(Error::validation(
                        "author",
                        "The author field is required when adding a new author.",
                    ));
                }
                check_len("author", Some(name.as_str()))?;
            }
        }

        if let Some(rating) = self.rating {
            if !(1..=5).contains(&rating) {
                return Err(Error::validation(
                    "rating",
                    "The rating must be between 1 and 5.",
                ));
            }
        }

        if let Some(missing) = self
            .category_ids
            .iter()
            .find(|id| !categories.iter().any(|c| c.id == **id))
        {
            return Err(Error::validation(
                "category_ids",
                format!("The selected category {} is invalid.", missing),
            ));
        }

        Ok(())
    }
}

/// Resolve the form's author choice, creating a new author on the fly.
pub fn resolve_author(choice: &AuthorChoice, authors: &mut Vec<Author>) -> Result<Option<Author>> {
    match choice {
        AuthorChoice::None => Ok(None),
        AuthorChoice::Existing(id) => authors
            .iter()
            .find(|a| a.id == *id)
            .cloned()
            .map(Some)
            .ok_or_else(|| Error::validation("author_id", "The selected author is invalid.")),
        AuthorChoice::New(name) => {
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::validation(
                    "author",
                    "The author field is required when adding a new author.",
                ));
            }
            let author = Author {
                id: authors.iter().map(|a| a.id).max().unwrap_or(0) + 1,
                name: name.to_string(),
            };
            authors.push(author.clone());
            Ok(Some(author))
        }
    }
}

/// Conjunctive filter over a user's books. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookFilter {
    pub search: Option<String>,
    #[serde(default)]
    pub categories: Vec<u64>,
    pub author: Option<u64>,
    pub is_read: Option<bool>,
    pub rating: Option<u8>,
}

impl BookFilter {
    pub fn matches(&self, book: &Book) -> bool {
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let hit = |value: Option<&str>| {
                value.is_some_and(|v| v.to_lowercase().contains(&needle))
            };
            if !(hit(Some(book.title.as_str()))
                || hit(book.isbn.as_deref())
                || hit(book.author.as_ref().map(|a| a.name.as_str())))
            {
                return false;
            }
        }

        if !self.categories.is_empty()
            && !book
                .categories
                .iter()
                .any(|c| self.categories.contains(&c.id))
        {
            return false;
        }

        if let Some(author) = self.author {
            if book.author_id() != Some(author) {
                return false;
            }
        }

        if let Some(is_read) = self.is_read {
            if book.is_read != is_read {
                return false;
            }
        }

        if let Some(rating) = self.rating {
            if book.rating != Some(rating) {
                return false;
            }
        }

        true
    }

    /// Matching books owned by `user_id`, newest first with id as tiebreak.
    pub fn apply<'a>(&self, user_id: u64, books: &'a [Book]) -> Vec<&'a Book> {
        let mut matched: Vec<&Book> = books
            .iter()
            .filter(|b| b.is_owned_by(user_id) && self.matches(b))
            .collect();
        matched.sort_by_key(|b| Reverse((b.created_at, b.id)));
        matched
    }
}

/// Client view of a book. `cover_image` is a URL, or `None` for the placeholder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookResource {
    pub id: u64,
    pub title: String,
    pub author_id: Option<u64>,
    pub author: Option<Author>,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub is_read: bool,
    pub rating: Option<u8>,
    pub notes: Option<String>,
    pub categories: Vec<Category>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookResource {
    pub fn from_book(book: &Book, cover_url: Option<String>) -> Self {
        Self {
            id: book.id,
            title: book.title.clone(),
            author_id: book.author_id(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            description: book.description.clone(),
            cover_image: cover_url,
            is_read: book.is_read,
            rating: book.rating,
            notes: book.notes.clone(),
            categories: book.categories.clone(),
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

/// Dashboard figures for one user's shelf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryStats {
    pub total_books: usize,
    pub read_books: usize,
    pub unread_books: usize,
    /// Mean over rated books only; `None` when nothing is rated.
    pub average_rating: Option<f64>,
    /// One entry per category name, ordered by name. A book counts once for
    /// each of its categories.
    pub books_by_category: Vec<CategoryCount>,
}

impl LibraryStats {
    pub fn for_user(user_id: u64, books: &[Book]) -> Self {
        let owned: Vec<&Book> = books.iter().filter(|b| b.is_owned_by(user_id)).collect();

        let read_books = owned.iter().filter(|b| b.is_read).count();
        let ratings: Vec<f64> = owned
            .iter()
            .filter_map(|b| b.rating.map(f64::from))
            .collect();
        let average_rating = if ratings.is_empty() {
            None
        } else {
            Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
        };

        let mut by_category: BTreeMap<&str, usize> = BTreeMap::new();
        for category in owned.iter().flat_map(|b| b.categories.iter()) {
            *by_category.entry(category.name.as_str()).or_default() += 1;
        }

        Self {
            total_books: owned.len(),
            read_books,
            unread_books: owned.len() - read_books,
            average_rating,
            books_by_category: by_category
                .into_iter()
                .map(|(category, count)| CategoryCount {
                    category: category.to_string(),
                    count,
                })
                .collect(),
        }
    }
}
