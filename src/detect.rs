use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What the project scanner hands to the orchestrator.
///
/// The full framework-scoring detector is an external collaborator;
/// the pipeline only consumes `language`, `build_plan`, `run_plan`,
/// and `meta["package_manager"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub framework: String,
    pub language: String,
    pub confidence: f32,
    pub signals: Vec<String>,
    pub build_plan: Vec<String>,
    pub run_plan: Vec<String>,
    pub meta: BTreeMap<String, String>,
}

impl Detection {
    #[must_use]
    pub fn package_manager(&self) -> Option<&str> {
        self.meta.get("package_manager").map(String::as_str)
    }
}

/// Detect language, framework, and default build/run plans from
/// marker files in the project root.
pub fn detect_project(path: &Path) -> Result<Detection> {
    if !path.is_dir() {
        return Err(Error::Validation(format!(
            "project path does not exist: {}",
            path.display()
        )));
    }

    let has = |name: &str| path.join(name).exists();
    let mut signals = Vec::new();
    let mut meta = BTreeMap::new();

    // Container projects win: a Dockerfile overrides language markers.
    if has("Dockerfile") {
        signals.push("Dockerfile".to_string());
        meta.insert("package_manager".to_string(), "docker".to_string());
        return Ok(Detection {
            framework: "Dockerfile".to_string(),
            language: "Container".to_string(),
            confidence: 1.0,
            signals,
            build_plan: vec!["docker compose build".to_string()],
            run_plan: vec!["docker compose up -d".to_string()],
            meta,
        });
    }

    if has("package.json") {
        signals.push("package.json".to_string());
        let pm = if has("bun.lockb") || has("bun.lock") {
            "bun"
        } else if has("pnpm-lock.yaml") {
            "pnpm"
        } else if has("yarn.lock") {
            "yarn"
        } else {
            "npm"
        };
        meta.insert("package_manager".to_string(), pm.to_string());

        let manifest = std::fs::read_to_string(path.join("package.json")).unwrap_or_default();
        let framework = js_framework(&manifest, &mut signals);

        let install = if pm == "npm" {
            "npm ci || npm install".to_string()
        } else {
            format!("{pm} install")
        };
        return Ok(Detection {
            framework: framework.to_string(),
            language: "JavaScript/TypeScript".to_string(),
            confidence: 0.9,
            signals,
            build_plan: vec![install, format!("{pm} run build")],
            run_plan: vec![format!("{pm} run start")],
            meta,
        });
    }

    if has("pyproject.toml") || has("requirements.txt") || has("manage.py") {
        for marker in ["pyproject.toml", "requirements.txt", "manage.py"] {
            if has(marker) {
                signals.push(marker.to_string());
            }
        }
        let pm = if has("uv.lock") {
            "uv"
        } else if has("poetry.lock") {
            "poetry"
        } else if has("Pipfile.lock") || has("Pipfile") {
            "pipenv"
        } else {
            "pip"
        };
        meta.insert("package_manager".to_string(), pm.to_string());

        let framework = if has("manage.py") { "Django" } else { "Python" };
        let (build_plan, run_plan) = python_plans(pm, framework);
        return Ok(Detection {
            framework: framework.to_string(),
            language: "Python".to_string(),
            confidence: 0.9,
            signals,
            build_plan,
            run_plan,
            meta,
        });
    }

    if has("go.mod") {
        signals.push("go.mod".to_string());
        meta.insert("package_manager".to_string(), "gomod".to_string());
        return Ok(Detection {
            framework: "Go".to_string(),
            language: "Go".to_string(),
            confidence: 0.9,
            signals,
            build_plan: vec!["go build -o app .".to_string()],
            run_plan: vec!["./app".to_string()],
            meta,
        });
    }

    if has("composer.json") {
        signals.push("composer.json".to_string());
        meta.insert("package_manager".to_string(), "composer".to_string());
        let framework = if has("artisan") { "Laravel" } else { "PHP" };
        if has("artisan") {
            signals.push("artisan".to_string());
        }
        return Ok(Detection {
            framework: framework.to_string(),
            language: "PHP".to_string(),
            confidence: 0.85,
            signals,
            build_plan: vec!["composer install --no-dev --optimize-autoloader".to_string()],
            run_plan: vec!["php -S 127.0.0.1:${PORT} -t public".to_string()],
            meta,
        });
    }

    if has("Gemfile") {
        signals.push("Gemfile".to_string());
        meta.insert("package_manager".to_string(), "bundler".to_string());
        let framework = if has("config.ru") { "Rails" } else { "Ruby" };
        return Ok(Detection {
            framework: framework.to_string(),
            language: "Ruby".to_string(),
            confidence: 0.85,
            signals,
            build_plan: vec!["bundle install --deployment".to_string()],
            run_plan: vec!["bundle exec puma -p ${PORT}".to_string()],
            meta,
        });
    }

    if has("pom.xml") || has("build.gradle") || has("build.gradle.kts") {
        let pm = if has("pom.xml") { "maven" } else { "gradle" };
        signals.push(if pm == "maven" { "pom.xml" } else { "build.gradle" }.to_string());
        meta.insert("package_manager".to_string(), pm.to_string());
        let build = if pm == "maven" {
            "mvn -q package -DskipTests"
        } else {
            "gradle build -x test"
        };
        return Ok(Detection {
            framework: "Java".to_string(),
            language: "Java".to_string(),
            confidence: 0.85,
            signals,
            build_plan: vec![build.to_string()],
            run_plan: vec!["java -jar target/app.jar".to_string()],
            meta,
        });
    }

    Err(Error::Validation(format!(
        "no recognized project markers in {}",
        path.display()
    )))
}

fn js_framework(manifest: &str, signals: &mut Vec<String>) -> &'static str {
    for (needle, name) in [
        ("\"next\"", "Next.js"),
        ("\"nuxt\"", "Nuxt"),
        ("\"astro\"", "Astro"),
        ("\"remix\"", "Remix"),
        ("\"express\"", "Express"),
        ("\"fastify\"", "Fastify"),
    ] {
        if manifest.contains(needle) {
            signals.push(format!("package.json dependency {needle}"));
            return name;
        }
    }
    "Node.js"
}

fn python_plans(pm: &str, framework: &str) -> (Vec<String>, Vec<String>) {
    let install = match pm {
        "poetry" => "poetry install --only main".to_string(),
        "uv" => "uv sync --no-dev".to_string(),
        "pipenv" => "pipenv install --deploy".to_string(),
        _ => "python -m venv .venv && .venv/bin/pip install -r requirements.txt".to_string(),
    };
    let run = if framework == "Django" {
        "gunicorn --bind 127.0.0.1:${PORT} $(python -c \"import pathlib; print(next(pathlib.Path('.').glob('*/wsgi.py')).parent.name)\").wsgi"
            .to_string()
    } else {
        "gunicorn --bind 127.0.0.1:${PORT} app:app".to_string()
    };
    (vec![install], vec![run])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[test]
    fn nextjs_with_pnpm() {
        let dir = project(&[
            ("package.json", r#"{"dependencies":{"next":"14.0.0"}}"#),
            ("pnpm-lock.yaml", ""),
        ]);
        let d = detect_project(dir.path()).unwrap();
        assert_eq!(d.framework, "Next.js");
        assert_eq!(d.language, "JavaScript/TypeScript");
        assert_eq!(d.package_manager(), Some("pnpm"));
        assert!(d.build_plan.iter().any(|c| c.contains("pnpm run build")));
    }

    #[test]
    fn django_with_poetry() {
        let dir = project(&[
            ("pyproject.toml", "[tool.poetry]"),
            ("poetry.lock", ""),
            ("manage.py", ""),
        ]);
        let d = detect_project(dir.path()).unwrap();
        assert_eq!(d.framework, "Django");
        assert_eq!(d.language, "Python");
        assert_eq!(d.package_manager(), Some("poetry"));
    }

    #[test]
    fn dockerfile_wins_over_language_markers() {
        let dir = project(&[("Dockerfile", "FROM alpine"), ("package.json", "{}")]);
        let d = detect_project(dir.path()).unwrap();
        assert_eq!(d.language, "Container");
    }

    #[test]
    fn go_module() {
        let dir = project(&[("go.mod", "module example.com/app")]);
        let d = detect_project(dir.path()).unwrap();
        assert_eq!(d.language, "Go");
        assert_eq!(d.run_plan, vec!["./app".to_string()]);
    }

    #[test]
    fn unknown_project_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = detect_project(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
