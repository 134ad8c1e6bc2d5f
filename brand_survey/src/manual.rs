/*!

This is the long-form manual for `brand_survey` and `brandpoll`.

## How a survey runs

Every respondent visit gets a session id and one form. A form bundles four
candidate names. All the forms share the same questions, and each question asks
the respondent to pick one of the four names. Two optional free-text answers
may be added at the end.

Forms are handed out so that completed submissions stay even across forms:
the form with the fewest submissions is chosen, and among equals the form that
was handed out the longest time ago (or never) wins. Handing out a form counts
even if the respondent never finishes, which spreads exposure across the forms
when many visits are abandoned.

## Rankings

For each question, the report lists:

- the top names: the names selected the most often, ties broken alphabetically;
- the bottom names, according to one of two strategies:
  - `voteCount`: the names selected the least often, among the names that were
    selected at least once;
  - `exposureGap` (default): the names with the largest difference between the
    number of times they were shown and the number of times they were picked.
    A name that appears on several forms is shown more often, so it is
    expected to collect more votes. Names never shown are left out.

What counts as "shown" is controlled by the exposure policy:
`completedSubmissions` (default) only counts finished surveys, `assignments`
also counts abandoned visits.

## Configuration

`brandpoll` runs with a built-in catalog of six forms and five questions. A
different catalog may be provided as a JSON file with the `--config` flag:

```text
{
  "forms": [
    { "id": 1, "title": "Survey Form A", "names": ["Aurora", "Beacon", "Catalyst", "Delta"] },
    { "id": 2, "title": "Survey Form B", "names": ["Evergreen", "Fusion", "Genesis", "Harmony"] }
  ],
  "questions": [
    { "id": "q1", "text": "Which name is the most memorable?" },
    { "id": "q2", "text": "Which name is the most trustworthy?" },
    { "id": "q3", "text": "Which name sounds the most professional?" },
    { "id": "q4", "text": "Which name would you be most likely to recommend?" },
    { "id": "q5", "text": "Which name do you like most overall?" }
  ],
  "rules": {
    "rankingStrategy": "exposureGap",
    "exposurePolicy": "completedSubmissions",
    "rankingDepth": 3,
    "maxFreeTextChars": 2000
  }
}
```

The `rules` section and each of its fields are optional.

Every form must list exactly four distinct names. The question ids must be
`q1` to `q5`: each of them is stored in a dedicated column.

The storage location is read from the `DATABASE_URL` environment variable,
for example `sqlite://survey.db`. The number of pooled connections can be set
with `DATABASE_POOL_SIZE` (10 by default).

## Commands

- `brandpoll init`: creates the tables, or adds the missing columns to an
  existing database.
- `brandpoll assign`: hands out a form to a new session and prints it in JSON.
- `brandpoll submit --form 3 --session <id> --answer q1=Philanthri ...`: records
  a completed survey.
- `brandpoll results [--json]`: prints the submission counts and the rankings.
- `brandpoll stats`: prints the submission count of every form.
- `brandpoll reconcile`: recomputes the submission counts from the stored
  submissions.
- `brandpoll export [--form <id>]`: prints the stored submissions in JSON.

 */
