use anyhow::Result;
use serde::Deserialize;
use serde_json::{Value, json};
use std::io::Write;

use crate::model::ChatModel;
use crate::structured::OutputSchema;

/// Movie details.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Movie {
    pub title: String,
    pub year: i32,
    pub director: String,
    pub rating: f64,
}

impl OutputSchema for Movie {
    const NAME: &'static str = "Movie";
    const DESCRIPTION: &'static str = "Movie details.";

    fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "The movie title"},
                "year": {"type": "integer", "description": "Release year"},
                "director": {"type": "string", "description": "Director's name"},
                "rating": {"type": "number", "description": "Rating out of 10"}
            },
            "required": ["title", "year", "director", "rating"]
        })
    }
}

fn print_movie(out: &mut impl Write, movie: &Movie, indent: &str) -> Result<()> {
    writeln!(out, "{indent}title: {}", movie.title)?;
    writeln!(out, "{indent}year: {}", movie.year)?;
    writeln!(out, "{indent}director: {}", movie.director)?;
    writeln!(out, "{indent}rating: {}", movie.rating)?;
    Ok(())
}

pub(super) async fn run(model: &ChatModel, out: &mut impl Write) -> Result<()> {
    let movie = model
        .with_structured_output::<Movie>()
        .invoke(
            "Provide the details of the movie Inception in JSON, including title, year, director and rating.",
        )
        .await?;
    print_movie(out, &movie, "")?;
    writeln!(out)?;

    writeln!(out, "=== with the raw reply ===")?;
    let response = model
        .with_structured_output::<Movie>()
        .invoke_with_raw(
            "Provide the details of the movie Interstellar in JSON, including title, year, director and rating.",
        )
        .await?;
    match (&response.parsed, &response.parsing_error) {
        (Some(movie), _) => {
            writeln!(out, "parsed data:")?;
            print_movie(out, movie, "  ")?;
        }
        (None, error) => {
            writeln!(
                out,
                "parsing failed: {}",
                error.as_deref().unwrap_or("unknown error")
            )?;
        }
    }
    writeln!(out)?;
    if let Some(usage) = &response.raw.usage {
        writeln!(out, "token usage: {usage}")?;
    }
    Ok(())
}
