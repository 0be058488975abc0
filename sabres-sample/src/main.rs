use models::{Director, Movie};
use sabres::{Model, Sabres, SabresConfig};

mod models;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        log::error!("Sample failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> sabres::Result<()> {
    let database = std::env::var("SABRES_DATABASE").unwrap_or_else(|_| "movies.db".to_string());
    log::info!("Opening database at: {database}");

    let sabres = Sabres::builder()
        .register_model::<Movie>()
        .register_model::<Director>()
        .open(SabresConfig::with_database(&database))?;

    let director: Director = sabres.create_model()?;
    director.set_name("David Fincher")?;

    let movie: Movie = sabres.create_model()?;
    movie.set_title("Fight Club")?;
    movie.set_year(1999)?;
    movie.set_director(&director)?;
    movie.set_actors(&["Edward Norton", "Brad Pitt", "Helena Bonham Carter"])?;

    // Saves the director first, then the movie and its cast list
    movie.object().save()?;
    log::info!(
        "Saved movie {} with director {}",
        movie.object().object_id(),
        director.object().object_id()
    );

    let found = sabres
        .query(Movie::CLASS_NAME)
        .equal_to("title", "Fight Club")
        .find()?;
    println!("{} movie(s) titled Fight Club", found.len());

    for object in found {
        let Some(movie) = Movie::cast(object) else {
            continue;
        };
        if let Some(director) = movie.director()? {
            director.object().fetch_in_background().wait()?;
            println!(
                "{} ({}) by {}, starring {}",
                movie.title()?.unwrap_or_default(),
                movie.year()?.unwrap_or_default(),
                director.name()?.unwrap_or_default(),
                movie.actors()?.join(", ")
            );
        }
    }

    director.set_name("David Andrew Leo Fincher")?;
    director
        .object()
        .save_with(|result| match result {
            Ok(()) => log::info!("Director renamed in the background"),
            Err(e) => log::warn!("Background rename failed: {e}"),
        })
        .join()
        .map_err(|_| sabres::SabresError::IllegalState("Background save panicked".into()))?;

    println!("Movies: {}", sabres.query(Movie::CLASS_NAME).count()?);
    Ok(())
}
