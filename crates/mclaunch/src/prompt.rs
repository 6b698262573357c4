use std::io::{self, BufRead, Write};

/// Interactive questions asked during a launch.
pub trait Prompt: Send + Sync {
    fn confirm(&self, question: &str) -> bool;

    /// Manual sign-in: show `auth_url`, return the URL the browser ended on.
    fn read_redirect_url(&self, auth_url: &str) -> io::Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn confirm(&self, question: &str) -> bool {
        let stdin = io::stdin();
        loop {
            print!("{question} [y|n] ");
            let _ = io::stdout().flush();
            let mut answer = String::new();
            match stdin.lock().read_line(&mut answer) {
                // Closed stdin cannot answer; treat as a refusal.
                Ok(0) | Err(_) => return false,
                Ok(_) => {}
            }
            match answer.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => return true,
                "n" | "no" => return false,
                _ => println!("Please enter y or n"),
            }
        }
    }

    fn read_redirect_url(&self, auth_url: &str) -> io::Result<String> {
        println!(
            "Please open {auth_url} in your browser and copy the url you are redirected to into the prompt below."
        );
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

/// Opens URLs for the automatic sign-in flow.
pub trait BrowserOpener: Send + Sync {
    fn open(&self, url: &str) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        webbrowser::open(url)
    }
}
