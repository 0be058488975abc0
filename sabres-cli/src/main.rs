use clap::{Parser, Subcommand, ValueEnum};
use sabres::{Sabres, SabresConfig, SabresObject, Value};
use std::path::PathBuf;
use std::process;
use tabled::builder::Builder;
use tabled::settings::Style;

/// Sabres CLI: inspect and edit a Sabres database from the command line
#[derive(Parser)]
#[command(name = "sabres", version, about)]
struct Cli {
    /// Path to the SQLite database file
    #[arg(long, default_value = "sabres.db")]
    db: String,

    /// YAML configuration file; overrides --db
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List the classes stored in the database
    Classes,

    /// Show the attributes of a class and their types
    Schema {
        /// Class name
        class: String,
    },

    /// Print every object of a class as a table
    Dump {
        /// Class name
        class: String,
    },

    /// Get a single object by id
    Get {
        /// Class name
        class: String,
        /// Object id
        id: i64,
    },

    /// List objects of a class, optionally filtered by attribute values
    List {
        /// Class name
        class: String,
        /// Equality filters (e.g. --filter title="Fight Club")
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
        /// Only print the number of matching objects
        #[arg(long)]
        count: bool,
    },

    /// Insert a new object
    Insert {
        /// Class name
        class: String,
        /// Attribute values (e.g. --field year=1999)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Update an existing object
    Update {
        /// Class name
        class: String,
        /// Object id
        id: i64,
        /// Attribute values to set (e.g. --field title=Heat)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Delete an object
    Delete {
        /// Class name
        class: String,
        /// Object id
        id: i64,
        /// Show what would be deleted without actually deleting
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or_else(|| {
        format!("Invalid key=value pair: no '=' found in '{s}'")
    })?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        // Machine-readable error on stderr
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => SabresConfig::from_file(path)?,
        None => SabresConfig::with_database(&cli.db),
    };
    let sabres = Sabres::builder().discover_classes().open(config)?;

    match cli.command {
        Command::Classes => {
            print_output(&serde_json::json!(sabres.class_names()), &cli.format)?;
        }

        Command::Schema { class } => {
            let schema = sabres
                .schema(&class)
                .ok_or_else(|| format!("Class {class} has never been saved"))?;
            let attributes: serde_json::Map<String, serde_json::Value> = schema
                .iter()
                .map(|(key, descriptor)| (key.clone(), descriptor.to_string().into()))
                .collect();
            print_output(&serde_json::Value::Object(attributes), &cli.format)?;
        }

        Command::Dump { class } => {
            let objects = sabres.fetch_all(&class)?;
            print!("{}", render_table(&sabres, &class, &objects)?);
        }

        Command::Get { class, id } => {
            let object = sabres.create_without_data(&class, id)?;
            object.fetch()?;
            print_output(&object.to_json(), &cli.format)?;
        }

        Command::List {
            class,
            filters,
            count,
        } => {
            let mut query = sabres.query(&class);
            for (key, raw) in &filters {
                query = query.equal_to(key, parse_value(&sabres, &class, key, raw)?);
            }
            if count {
                print_output(&serde_json::json!({ "count": query.count()? }), &cli.format)?;
            } else {
                let objects: Vec<serde_json::Value> =
                    query.find()?.iter().map(SabresObject::to_json).collect();
                print_output(&serde_json::Value::Array(objects), &cli.format)?;
            }
        }

        Command::Insert { class, fields } => {
            let object = sabres.create(&class)?;
            apply_fields(&sabres, &object, &fields)?;
            object.save()?;
            print_output(
                &serde_json::json!({ "objectId": object.object_id() }),
                &cli.format,
            )?;
        }

        Command::Update { class, id, fields } => {
            let object = sabres.create_without_data(&class, id)?;
            object.fetch()?;
            apply_fields(&sabres, &object, &fields)?;
            object.save()?;
            print_output(&serde_json::json!({ "ok": true, "objectId": id }), &cli.format)?;
        }

        Command::Delete { class, id, dry_run } => {
            let object = sabres.create_without_data(&class, id)?;
            if dry_run {
                // Check the object exists and show what would be deleted
                object.fetch()?;
                print_output(
                    &serde_json::json!({
                        "dry_run": true,
                        "would_delete": { "class": class, "objectId": id },
                        "object": object.to_json(),
                    }),
                    &cli.format,
                )?;
            } else {
                object.delete()?;
                print_output(&serde_json::json!({ "ok": true, "deleted": id }), &cli.format)?;
            }
        }
    }

    Ok(())
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

/// Interpret a command-line value: JSON when it parses, a plain string otherwise,
/// coerced to the attribute's type when the class already has one.
fn parse_value(
    sabres: &Sabres,
    class: &str,
    key: &str,
    raw: &str,
) -> Result<Value, Box<dyn std::error::Error>> {
    let json = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    let schema = sabres.schema(class);
    let descriptor = schema.as_ref().and_then(|schema| schema.get(key));
    let detached = |class: &str, id: i64| sabres.create_without_data(class, id);
    Ok(Value::from_json(&json, descriptor, &detached)?)
}

fn apply_fields(
    sabres: &Sabres,
    object: &SabresObject,
    fields: &[(String, String)],
) -> Result<(), Box<dyn std::error::Error>> {
    for (key, raw) in fields {
        object.put(key, parse_value(sabres, object.class_name(), key, raw)?)?;
    }
    Ok(())
}

fn render_table(
    sabres: &Sabres,
    class: &str,
    objects: &[SabresObject],
) -> Result<String, Box<dyn std::error::Error>> {
    let Some(schema) = sabres.schema(class) else {
        return Ok(format!("Class {class} has no stored objects\n"));
    };

    let mut builder = Builder::default();
    builder.push_record(schema.columns());
    for object in objects {
        let mut record = vec![object.object_id().to_string()];
        for key in schema.keys() {
            record.push(object.stringify(key)?);
        }
        builder.push_record(record);
    }
    let mut table = builder.build();
    table.with(Style::rounded());
    Ok(format!("{table}\n"))
}
