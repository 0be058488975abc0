use sabres::{Model, Result, SabresObject};

pub struct Director(SabresObject);

impl Model for Director {
    const CLASS_NAME: &'static str = "Director";

    fn from_object(object: SabresObject) -> Self {
        Director(object)
    }

    fn object(&self) -> &SabresObject {
        &self.0
    }
}

impl Director {
    pub fn name(&self) -> Result<Option<String>> {
        self.0.get_string("name")
    }

    pub fn set_name(&self, name: &str) -> Result<()> {
        self.0.put("name", name)
    }
}

pub struct Movie(SabresObject);

impl Model for Movie {
    const CLASS_NAME: &'static str = "Movie";

    fn from_object(object: SabresObject) -> Self {
        Movie(object)
    }

    fn object(&self) -> &SabresObject {
        &self.0
    }
}

impl Movie {
    pub fn title(&self) -> Result<Option<String>> {
        self.0.get_string("title")
    }

    pub fn set_title(&self, title: &str) -> Result<()> {
        self.0.put("title", title)
    }

    pub fn year(&self) -> Result<Option<i16>> {
        self.0.get_short("year")
    }

    pub fn set_year(&self, year: i16) -> Result<()> {
        self.0.put("year", year)
    }

    /// The director, not yet fetched.
    pub fn director(&self) -> Result<Option<Director>> {
        Ok(self.0.get_object("director")?.and_then(Director::cast))
    }

    pub fn set_director(&self, director: &Director) -> Result<()> {
        self.0.put("director", director.object())
    }

    pub fn actors(&self) -> Result<Vec<String>> {
        let cast = self.0.get_list("cast")?.unwrap_or_default();
        Ok(cast.iter().map(ToString::to_string).collect())
    }

    pub fn set_actors(&self, cast: &[&str]) -> Result<()> {
        self.0.add_all("cast", cast.iter().copied())
    }
}
