//! Schedule file loading
//!
//! Schedules are XML documents with a `Schedule` root. Each child element
//! is a task whose element name selects its kind; nesting expresses
//! parent/child relationships:
//!
//! ```xml
//! <Schedule Name="Delta" StopOnIncompletion="true">
//!   <ManagementAgent Name="AD" RunProfile="DISO" Enabled="true">
//!     <ContinuationCondition Type="ManagementAgentsHadImports" Enabled="true">
//!       <ManagementAgent Name="AD" RunProfile="DS" Enabled="true" />
//!     </ContinuationCondition>
//!   </ManagementAgent>
//!   <SqlServer Name="Stats" Command="exec uspStats" Server="sql01" Enabled="false" />
//! </Schedule>
//! ```
//!
//! Disabled elements are dropped together with their subtree. Element
//! names are matched case-insensitively, attribute names exactly.

use crate::schedule::types::{ContinuationConditionKind, Schedule, ScheduleTask, TaskKind};
use crate::schedule::validation::{ScheduleError, validate_block_siblings};
use quick_xml::{Reader, events::BytesStart, events::Event};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Schedule file '{path}' not found")]
    NotFound { path: PathBuf },

    #[error("IO error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed schedule XML: {0}")]
    Xml(String),

    #[error("Schedule file contains no root element")]
    Empty,

    #[error("No root Schedule node found in the schedule file (found '{found}')")]
    MissingScheduleRoot { found: String },

    #[error("{attribute} attribute is either missing or has an invalid value for a {element} node")]
    MissingAttribute { element: String, attribute: String },

    #[error("Invalid boolean '{value}' for the {attribute} attribute of a {element} node")]
    InvalidBoolean {
        element: String,
        attribute: String,
        value: String,
    },

    #[error(
        "Either no value or an invalid value ('{value}') was supplied for the Type attribute on a ContinuationCondition node"
    )]
    InvalidCondition { value: String },

    #[error("Unknown schedule node '{0}'")]
    UnknownElement(String),

    #[error(transparent)]
    Invalid(#[from] ScheduleError),
}

/// Generic element tree, built before any schedule semantics apply
#[derive(Debug, Clone)]
struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlElement>,
}

impl XmlElement {
    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Attribute that must be present and non-empty
    fn required(&self, key: &str) -> Result<String, LoadError> {
        match self.attribute(key) {
            Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
            _ => Err(LoadError::MissingAttribute {
                element: self.name.clone(),
                attribute: key.to_string(),
            }),
        }
    }

    /// Optional strict boolean (`true` / `false`, any case)
    fn optional_bool(&self, key: &str) -> Result<Option<bool>, LoadError> {
        let Some(raw) = self.attribute(key) else {
            return Ok(None);
        };
        match raw.trim() {
            value if value.eq_ignore_ascii_case("true") => Ok(Some(true)),
            value if value.eq_ignore_ascii_case("false") => Ok(Some(false)),
            _ => Err(LoadError::InvalidBoolean {
                element: self.name.clone(),
                attribute: key.to_string(),
                value: raw.to_string(),
            }),
        }
    }

    /// Lenient flag: only the literal `true` (any case) enables it
    fn flag(&self, key: &str) -> bool {
        self.attribute(key)
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
    }

    fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Loads schedule definitions into the task model
pub struct ScheduleLoader;

impl ScheduleLoader {
    /// Load and validate a schedule from an XML file
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Schedule, LoadError> {
        let path = path.as_ref().to_path_buf();
        debug!("Loading schedule file: {:?}", path);

        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LoadError::NotFound { path: path.clone() },
            _ => LoadError::Io {
                path: path.clone(),
                source: e,
            },
        })?;

        let schedule = Self::parse_str(&content)?;
        info!(
            "Loaded schedule '{}' from {:?} with {} enabled tasks",
            schedule.name,
            path,
            schedule.task_count()
        );
        Ok(schedule)
    }

    /// Parse and validate a schedule from XML text
    pub fn parse_str(xml: &str) -> Result<Schedule, LoadError> {
        let root = parse_document(xml)?;
        build_schedule(&root)
    }
}

fn parse_document(xml: &str) -> Result<XmlElement, LoadError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut open: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Err(err) => return Err(LoadError::Xml(err.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(tag)) => open.push(element_from(&tag)?),
            Ok(Event::Empty(tag)) => {
                let element = element_from(&tag)?;
                attach(&mut open, &mut root, element)?;
            }
            Ok(Event::End(tag)) => {
                let element = open.pop().ok_or_else(|| {
                    LoadError::Xml(format!(
                        "unexpected closing tag '{}'",
                        String::from_utf8_lossy(tag.name().as_ref())
                    ))
                })?;
                attach(&mut open, &mut root, element)?;
            }
            Ok(_) => continue,
        }
    }

    if let Some(unclosed) = open.last() {
        return Err(LoadError::Xml(format!(
            "element '{}' is never closed",
            unclosed.name
        )));
    }

    root.ok_or(LoadError::Empty)
}

fn element_from(tag: &BytesStart<'_>) -> Result<XmlElement, LoadError> {
    let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
    let mut attributes = Vec::new();

    for attribute in tag.attributes() {
        let attribute = attribute.map_err(|e| LoadError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| LoadError::Xml(e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(XmlElement {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn attach(
    open: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), LoadError> {
    if let Some(parent) = open.last_mut() {
        parent.children.push(element);
        Ok(())
    } else if root.is_some() {
        Err(LoadError::Xml(format!(
            "more than one root element ('{}')",
            element.name
        )))
    } else {
        *root = Some(element);
        Ok(())
    }
}

fn build_schedule(root: &XmlElement) -> Result<Schedule, LoadError> {
    if !root.is_named("Schedule") {
        return Err(LoadError::MissingScheduleRoot {
            found: root.name.clone(),
        });
    }

    let name = root.required("Name")?;
    let stop_on_incompletion = root.optional_bool("StopOnIncompletion")?.unwrap_or(false);
    let tasks = build_tasks(&root.children)?;

    validate_block_siblings(&tasks, &name)?;

    Ok(Schedule {
        name,
        stop_on_incompletion,
        tasks,
    })
}

fn build_tasks(elements: &[XmlElement]) -> Result<Vec<ScheduleTask>, LoadError> {
    let mut tasks = Vec::with_capacity(elements.len());
    for element in elements {
        let enabled = element
            .attribute("Enabled")
            .ok_or_else(|| LoadError::MissingAttribute {
                element: element.name.clone(),
                attribute: "Enabled".to_string(),
            })?;

        if !enabled.trim().eq_ignore_ascii_case("true") {
            debug!(
                "Skipping disabled {} node '{}' and its children",
                element.name,
                element.attribute("Name").unwrap_or_default()
            );
            continue;
        }

        tasks.push(build_task(element)?);
    }
    Ok(tasks)
}

fn build_task(element: &XmlElement) -> Result<ScheduleTask, LoadError> {
    let mut task = match element.name.to_ascii_lowercase().as_str() {
        "managementagent" => ScheduleTask::new(
            element.required("Name")?,
            TaskKind::DirectorySyncRun {
                run_profile: element.required("RunProfile")?,
                only_if_pending_exports: element.flag("OnlyIfPendingExportsExist"),
            },
        ),
        "executable" => ScheduleTask::new(
            element.required("Name")?,
            TaskKind::Executable {
                command: element.required("Command")?,
                arguments: element.attribute("Arguments").map(str::to_string),
                show_window: element.optional_bool("ShowWindow")?.unwrap_or(false),
            },
        ),
        "powershell" => ScheduleTask::new(
            element.required("Name")?,
            TaskKind::PowerShellScript {
                path: element.required("Path")?,
            },
        ),
        "visualbasicscript" => ScheduleTask::new(
            element.required("Name")?,
            TaskKind::VisualBasicScript {
                path: element.required("Path")?,
            },
        ),
        "sqlserver" => ScheduleTask::new(
            element.required("Name")?,
            TaskKind::DatabaseCommand {
                command: element.required("Command")?,
                server: element.required("Server")?,
            },
        ),
        "continuationcondition" => {
            let condition = match element.attribute("Type") {
                Some(value) if value.eq_ignore_ascii_case("ManagementAgentsHadImports") => {
                    ContinuationConditionKind::ManagementAgentsHadImports
                }
                other => {
                    return Err(LoadError::InvalidCondition {
                        value: other.unwrap_or_default().to_string(),
                    });
                }
            };
            ScheduleTask::continuation_condition(condition)
        }
        "block" => ScheduleTask::block(element.required("Name")?),
        _ => return Err(LoadError::UnknownElement(element.name.clone())),
    };

    task.children = build_tasks(&element.children)?;
    Ok(task)
}
