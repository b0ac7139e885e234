/*!

This is the long-form manual for `bipolar_outranking` and `outrank`.

## The performance tableau

A performance tableau is read from a JSON document:

```json
{
  "name": "cars",
  "NA": -999,
  "actions": { "a1": {"name": "Sedan", "comment": "2019"}, "a2": {} },
  "criteria": {
    "price": {"name": "Price", "weight": 2, "scale": [0, 50000],
              "preferenceDirection": "min",
              "thresholds": {"ind": [500, 0], "pref": [2000, 0], "veto": [20000, 0]}},
    "speed": {"weight": 1, "scale": [0, 300]}
  },
  "evaluation": {
    "price": {"a1": 21000, "a2": "NA"},
    "speed": {"a1": 190, "a2": 210}
  }
}
```

Notes:
- mappings keep their order: it is the order of the actions and criteria in every output
- a threshold `[a, b]` means `a + b * |x|` where `x` is the evaluation of the first action of the pair
- an evaluation equal to the `NA` number, the string `"NA"` or `null` is missing. The `NA`
  number (default `-999`) must lie outside every scale
- every declared (criterion, action) pair must be evaluated
- without `preferenceDirection`, a negative weight means minimizing with the absolute weight
  and a positive weight means maximizing. A negative weight together with an explicit
  `preferenceDirection` is refused by the reader

### Thresholds

The following thresholds are supported:
* `ind` indifference: differences up to `ind` against the first action still count as full support
* `pref` preference: differences beyond `pref` count as full opposition. Between `ind` and `pref`
  the support decreases linearly
* `weakPreference` must lie between `ind` and `pref`. It is only checked
* `veto` considerable difference: it makes the outranking certain (or certainly false), or
  indeterminate if it contradicts the majority
* `weakVeto` weak considerable difference: it only brings a contradicted majority back to
  indeterminate

Negative thresholds, `ind > pref` or `weakPreference` outside `[ind, pref]` are refused.
A `veto` below `pref`, or a `weakVeto` above `veto`, is ignored with a warning.

## The outranking relation

The characteristic value `r(x S y)` lies in `[-1, 1]` (or `[-W, W]` unnormalized, with `W` the
weight sum):
- `r > 0`: "x is at least as good as y" is validated by a weighted majority
- `r < 0`: it is invalidated
- `r = 0`: indeterminate

Missing evaluations vote 0, and the weight of their criterion still counts in `W`.

## Sorting and sparse digraphs

The quantiles sorting cuts each criterion at its empirical quantiles (R type 7) and places each
action in the categories it fits with a bipolar credibility of at least 0.

The pre-ranked (sparse) digraph groups actions with the same sorting into ordered components.
Only the relation inside the components is computed. The fill rate is the share of the computed
pairs. Ordering strategies:
* `average`: by the middle of the categories range
* `optimistic`: by the highest category
* `pessimistic`: by the lowest category
* `optimal`: by the middle of the range, then by the credibility of the bounds

## Ranking rules

* `Copeland`: net number of polarized wins
* `NetFlows`: sum of the valued net flows
* `Kohler`: repeatedly picks the best maximin action
* `ArrowRaynaud`: repeatedly picks the worst minimax action

Ties are broken by increasing action identifier.

## The `outrank` command

```text
outrank --tableau cars.json --rule Kohler --out summary.json
outrank --config analysis.json --reference expected_summary.json
```

The configuration file accepts the keys `tableau` (relative to the configuration file), `mode`
(`dense` or `sparse`), `rankingRule`, `quantiles`, `strategy`, `lowerClosed`,
`minComponentSize`, `threads`, `normalized`, `symmetricThresholds`, `naWarningThreshold` and
`marginalCorrelations`. The command line arguments take precedence.

*/
