//! Interactive console: banner, section headers, prompts and the text views
//! of draw information, order summary and run results.
//!
//! Generic over the reader and writer so the views can be tested against
//! in-memory buffers.

use std::io::{self, BufRead, Stdout, Write};

use rust_decimal::Decimal;

use crate::draw::DrawInfo;
use crate::engine::{LiquidityPlan, RunReport};
use crate::types::RunOutcome;
use crate::wallet::AddressBalance;

const BANNER: &str = r#"
============================================================
                 vLotto Ticket Buyer
============================================================
"#;

const RULE: &str = "------------------------------------------------------------";

pub struct Console<R, W> {
    input: R,
    out: W,
}

impl Console<io::StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, out: W) -> Self {
        Self { input, out }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    pub fn banner(&mut self) -> io::Result<()> {
        writeln!(self.out, "{BANNER}")
    }

    pub fn section(&mut self, title: &str) -> io::Result<()> {
        writeln!(self.out, "\n{RULE}\n{title:^60}\n{RULE}")
    }

    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")
    }

    // -----------------------------------------------------------------------
    // Prompts
    // -----------------------------------------------------------------------

    /// Ask for a line of input; an empty answer (or end of input) takes the
    /// default.
    pub fn prompt(&mut self, text: &str, default: Option<&str>) -> io::Result<String> {
        match default {
            Some(d) => write!(self.out, "{text} [{d}]: ")?,
            None => write!(self.out, "{text}: ")?,
        }
        self.out.flush()?;

        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        let answer = answer.trim();
        Ok(if answer.is_empty() {
            default.unwrap_or_default().to_string()
        } else {
            answer.to_string()
        })
    }

    pub fn confirm(&mut self, text: &str, default_yes: bool) -> io::Result<bool> {
        let default = if default_yes { "y" } else { "n" };
        let answer = self.prompt(&format!("{text} (y/n)"), Some(default))?;
        Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
    }

    /// Positive ticket count, or `None` if the answer is not one.
    pub fn ask_quantity(&mut self) -> io::Result<Option<u32>> {
        let answer = self.prompt("\nHow many tickets to buy", Some("1"))?;
        Ok(answer.parse::<u32>().ok().filter(|q| *q > 0))
    }

    /// Pick one of `addresses` by number, or take the answer as an address.
    pub fn choose_address(&mut self, addresses: &[AddressBalance], reserve: &str, asset: &str) -> io::Result<String> {
        if addresses.is_empty() {
            writeln!(self.out, "No addresses with {reserve} balance found.")?;
            return self.prompt("Enter address manually", None);
        }

        writeln!(self.out, "\nAddresses with {reserve} balance:")?;
        for (i, a) in addresses.iter().enumerate() {
            writeln!(self.out, "  [{}] {}", i + 1, a.address)?;
            writeln!(
                self.out,
                "      {reserve}: {:.8}  |  {asset}: {:.8}",
                a.reserve, a.asset
            )?;
        }
        writeln!(self.out)?;

        let choice = self.prompt(
            &format!("Select address (1-{}) or enter manually", addresses.len()),
            Some("1"),
        )?;
        Ok(match choice.parse::<usize>() {
            Ok(n) if (1..=addresses.len()).contains(&n) => addresses[n - 1].address.clone(),
            _ => choice,
        })
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    pub fn show_draw(&mut self, info: &DrawInfo, asset: &str, my_tickets: &[String]) -> io::Result<()> {
        self.section("DRAW INFORMATION")?;
        let total = info
            .total_tickets
            .map(|t| t.to_string())
            .unwrap_or_else(|| "?".into());

        writeln!(self.out, "  Draw Block:        {}", info.draw_block)?;
        if let (Some(blocks), Some(eta)) = (info.blocks_until, info.eta()) {
            writeln!(self.out, "  Blocks Until Draw: {blocks} ({eta})")?;
        }
        if let Some(j) = info.jackpot {
            writeln!(self.out, "  Jackpot:           {j} {asset}")?;
        }
        if let Some(m) = info.required_matches {
            writeln!(self.out, "  Matches to Win:    {m}")?;
        }
        if info.total_tickets.is_some() {
            writeln!(self.out, "  Total Tickets:     {total}")?;
        }
        writeln!(self.out, "  Available Offers:  {} of {total}", info.available)?;
        writeln!(self.out, "  Ticket Price:      {} {asset} each", info.ticket_price)?;
        if let Some(phase) = &info.phase {
            writeln!(self.out, "  Current Phase:     {phase}")?;
        }

        writeln!(
            self.out,
            "\n  Your Tickets:      {} for this draw (all wallet addresses)",
            my_tickets.len()
        )?;
        if !my_tickets.is_empty() {
            writeln!(self.out, "    {}", my_tickets.join(", "))?;
        }
        Ok(())
    }

    pub fn show_order(
        &mut self,
        quantity: u32,
        price: Decimal,
        plan: &LiquidityPlan,
        reserve_balance: Decimal,
        reserve: &str,
    ) -> io::Result<()> {
        self.section("ORDER SUMMARY")?;
        let asset = &plan.currency;
        writeln!(self.out, "\n  Tickets to buy:    {quantity}")?;
        writeln!(self.out, "  Cost per ticket:   {price} {asset}")?;
        writeln!(self.out, "  Total {asset}:      {:.8} {asset}", plan.required)?;
        writeln!(self.out, "\n  Your {asset}:       {:.8}", plan.balance)?;

        match &plan.route {
            Some(route) => {
                writeln!(self.out, "  Deficit:           {:.8} {asset}", plan.deficit)?;
                writeln!(
                    self.out,
                    "  + {:.1}% buffer:      {:.8} {asset}",
                    plan.buffer * Decimal::ONE_HUNDRED,
                    plan.buffered
                )?;
                writeln!(self.out, "\n  {reserve} needed:       {:.8} {reserve}", route.source_amount)?;
                writeln!(self.out, "  Your {reserve}:         {reserve_balance:.8}")?;
                writeln!(self.out, "  Swap via:          {}", route.via)?;
                if reserve_balance < route.source_amount {
                    writeln!(self.out, "\n  WARNING: Insufficient {reserve} balance!")?;
                    writeln!(
                        self.out,
                        "     Need {:.8}, have {reserve_balance:.8}",
                        route.source_amount
                    )?;
                }
            }
            None => writeln!(self.out, "\n  Sufficient {asset} balance, no swap needed")?,
        }
        writeln!(self.out, "\n{RULE}")
    }

    pub fn show_result(&mut self, report: &RunReport, error_limit: usize) -> io::Result<()> {
        writeln!(self.out, "\n{}", "=".repeat(60))?;
        writeln!(self.out, "{:^60}", "RESULT")?;
        writeln!(self.out, "{}", "=".repeat(60))?;

        let (b, t) = (report.bought, report.target);
        match report.outcome {
            RunOutcome::Success => writeln!(self.out, "\n  SUCCESS: Bought {b}/{t} tickets")?,
            RunOutcome::Partial => writeln!(self.out, "\n  PARTIAL: Bought {b}/{t} tickets")?,
            RunOutcome::Failed => writeln!(self.out, "\n  FAILED: Could not buy any tickets")?,
        }
        if report.dry_run {
            writeln!(self.out, "  (dry run: nothing was broadcast)")?;
        }
        if let Some(c) = &report.conversion {
            writeln!(self.out, "\n  Swap: {}", c.txid.as_deref().unwrap_or(&c.submission_id))?;
        }

        if !report.purchased.is_empty() {
            writeln!(self.out, "\n  Purchased tickets:")?;
            for p in &report.purchased {
                writeln!(self.out, "    - {}", p.ticket)?;
            }
        }

        if !report.errors.is_empty() && report.bought < report.target {
            let (shown, remaining) = report.error_summary(error_limit);
            writeln!(self.out, "\n  Errors (races with other buyers are normal):")?;
            for e in shown {
                writeln!(self.out, "    - {}: {}", e.ticket, truncate(&e.message, 60))?;
            }
            if remaining > 0 {
                writeln!(self.out, "    ... (+{remaining} more)")?;
            }
        }
        if let Some(reason) = &report.aborted {
            writeln!(self.out, "\n  Stopped early: {reason}")?;
        }
        Ok(())
    }

    pub fn show_holdings(&mut self, balance: &AddressBalance, tickets: &[String], reserve: &str, asset: &str) -> io::Result<()> {
        self.section("YOUR TICKETS")?;
        writeln!(self.out, "\n  Address: {}", balance.address)?;
        writeln!(self.out, "  {reserve} balance:   {:.8}", balance.reserve)?;
        writeln!(self.out, "  {asset} balance: {:.8}", balance.asset)?;
        writeln!(self.out, "  Tickets owned:  {}", tickets.len())?;
        if !tickets.is_empty() {
            writeln!(self.out, "    {}", tickets.join(", "))?;
        }
        writeln!(self.out)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
